pub const DEFAULT_RCON_PORT: u16 = 25575;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconSettings {
    /// `host:port`; a bare host gets [`DEFAULT_RCON_PORT`].
    pub address: String,
    pub password: String,
}

impl RconSettings {
    pub fn new(address: impl AsRef<str>, password: impl Into<String>) -> Self {
        Self {
            address: with_default_port(address.as_ref()),
            password: password.into(),
        }
    }
}

fn with_default_port(address: &str) -> String {
    let address = address.trim();
    if let Some((host, port)) = address.rsplit_once(':') {
        let bracketed_or_plain = !host.contains(':') || host.ends_with(']');
        if bracketed_or_plain && port.parse::<u16>().is_ok() {
            return address.to_string();
        }
    }
    if address.contains(':') && !address.starts_with('[') {
        // Bare IPv6 literal.
        return format!("[{address}]:{DEFAULT_RCON_PORT}");
    }
    format!("{address}:{DEFAULT_RCON_PORT}")
}
