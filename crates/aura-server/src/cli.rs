use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "aura-server", about = "Aura presence and messaging server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/aura.toml")]
    pub config: String,
}
