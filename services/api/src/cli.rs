use crate::infra::{self, StoreHandle};
use crate::server;
use clap::{Args, Parser, Subcommand, ValueEnum};
use classbook::accounts::UserRole;
use classbook::booking::{ClassRepository, EnrollmentRepository};
use classbook::config::{AppConfig, StorageBackend};
use classbook::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "classbook",
    about = "Run and administer the class booking service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect or load the class catalog
    Classes {
        #[command(subcommand)]
        command: ClassesCommand,
    },
    /// Issue registration invites
    Invites {
        #[command(subcommand)]
        command: InvitesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ClassesCommand {
    /// Print every class with seat and waitlist counts
    List(StorageArgs),
    /// Import classes from a `Title,Instructor,Schedule,Capacity` CSV file
    Import {
        /// Path to the CSV file
        csv: PathBuf,
        #[command(flatten)]
        storage: StorageArgs,
    },
}

#[derive(Subcommand, Debug)]
enum InvitesCommand {
    /// Create a single-use invite and print its token
    Create {
        #[arg(long, value_enum, default_value_t = InviteRole::Member)]
        role: InviteRole,
        /// Email the invite is intended for
        #[arg(long)]
        email: Option<String>,
        #[command(flatten)]
        storage: StorageArgs,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InviteRole {
    Admin,
    Member,
}

impl From<InviteRole> for UserRole {
    fn from(value: InviteRole) -> Self {
        match value {
            InviteRole::Admin => UserRole::Admin,
            InviteRole::Member => UserRole::Member,
        }
    }
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    #[command(flatten)]
    pub(crate) storage: StorageArgs,
}

#[derive(Args, Debug, Default)]
pub(crate) struct StorageArgs {
    /// `memory` or a SQLite file path; overrides APP_DATABASE_URL
    #[arg(long)]
    pub(crate) database: Option<String>,
}

impl StorageArgs {
    pub(crate) fn apply(&self, config: &mut AppConfig) -> Result<(), AppError> {
        if let Some(raw) = self.database.as_deref() {
            config.storage.backend = StorageBackend::parse(raw)?;
        }
        Ok(())
    }
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Classes {
            command: ClassesCommand::List(storage),
        } => list_classes(&storage),
        Command::Classes {
            command: ClassesCommand::Import { csv, storage },
        } => import_classes(csv, &storage),
        Command::Invites {
            command:
                InvitesCommand::Create {
                    role,
                    email,
                    storage,
                },
        } => create_invite(role.into(), email, &storage),
    }
}

fn open_store(storage: &StorageArgs) -> Result<StoreHandle, AppError> {
    let mut config = AppConfig::load()?;
    storage.apply(&mut config)?;
    infra::open_store(&config.storage.backend)
}

fn list_classes(storage: &StorageArgs) -> Result<(), AppError> {
    match open_store(storage)? {
        StoreHandle::Memory(store) => print_classes(store.as_ref()),
        StoreHandle::Sqlite(store) => print_classes(store.as_ref()),
    }
}

fn print_classes<S>(store: &S) -> Result<(), AppError>
where
    S: ClassRepository + EnrollmentRepository,
{
    let classes = store.list_classes()?;
    if classes.is_empty() {
        println!("No classes scheduled.");
        return Ok(());
    }

    println!(
        "{:<5} {:<28} {:<18} {:<17} {:>9} {:>8}",
        "ID", "Title", "Instructor", "Schedule (UTC)", "Seats", "Waiting"
    );
    for class in classes {
        let confirmed = store.count_confirmed(class.id)?;
        let waiting = store.list_waitlist_by_class(class.id, u32::MAX)?.len();
        println!(
            "{:<5} {:<28} {:<18} {:<17} {:>9} {:>8}",
            class.id,
            class.title,
            class.instructor,
            class.schedule.format("%Y-%m-%d %H:%M"),
            format!("{confirmed}/{}", class.capacity),
            waiting
        );
    }
    Ok(())
}

fn import_classes(csv: PathBuf, storage: &StorageArgs) -> Result<(), AppError> {
    let classes = classbook::booking::load_csv(&csv)?;
    let created = match open_store(storage)? {
        StoreHandle::Memory(store) => classbook::booking::import_classes(store.as_ref(), classes)?,
        StoreHandle::Sqlite(store) => classbook::booking::import_classes(store.as_ref(), classes)?,
    };

    println!("Imported {} classes from {}", created.len(), csv.display());
    for class in created {
        println!("  #{} {} ({} seats)", class.id, class.title, class.capacity);
    }
    Ok(())
}

fn create_invite(
    role: UserRole,
    email: Option<String>,
    storage: &StorageArgs,
) -> Result<(), AppError> {
    let invite = match open_store(storage)? {
        StoreHandle::Memory(store) => infra::issue_invite(store.as_ref(), role, email)?,
        StoreHandle::Sqlite(store) => infra::issue_invite(store.as_ref(), role, email)?,
    };
    println!("{} invite: {}", invite.role.label(), invite.token);
    Ok(())
}
