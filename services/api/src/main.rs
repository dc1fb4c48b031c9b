use classbook_api::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("classbook error: {err}");
        std::process::exit(1);
    }
}
