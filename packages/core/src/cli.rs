use clap::Parser;

/// Ombruk backend CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "ombruk-backend",
    version,
    about = "Coordination backend for municipal reuse stations and partners"
)]
pub struct Cli {
    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Address to bind the HTTP server to (overrides BIND_ADDR)
    #[arg(long)]
    pub bind: Option<String>,
}

impl Cli {
    pub fn apply(self, config: &mut crate::config::Config) {
        if let Some(url) = self.database_url {
            config.database_url = url;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
    }
}
