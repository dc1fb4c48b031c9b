use uuid::Uuid;

/// Issues opaque session tokens.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTokenIssuer;

impl TokenIssuer for UuidTokenIssuer {
    fn issue(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
