use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "fhirbridge")]
#[command(about = "FhirBridge CLI: JWT-bearer client authentication for FHIR servers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (default: ./fhirbridge.toml if present)
    #[arg(short, long, global = true, env = "FHIRBRIDGE_CONFIG")]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a signing key pair
    Keygen(KeygenArgs),
    /// Build jwks.json from the stored public key and print it
    Jwks,
    /// Register this client with the authorization server
    Register(RegisterArgs),
    /// Print a freshly signed client assertion
    Sign,
    /// Verify a client assertion against the active JWKS key
    Verify(VerifyArgs),
    /// Obtain an access token
    Token(TokenArgs),
    /// Search FHIR resources using a freshly obtained token
    Fetch(FetchArgs),
    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct KeygenArgs {
    /// Signing algorithm the key is for (defaults to the configured one)
    #[arg(long)]
    pub algorithm: Option<String>,
    /// RSA modulus size in bits
    #[arg(long, default_value_t = 2048)]
    pub bits: usize,
    /// Overwrite an existing key pair
    #[arg(long)]
    pub force: bool,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum AuthMethodArg {
    /// Signed client assertions, JWKS sent at registration
    #[default]
    PrivateKeyJwt,
    /// Shared secret via HTTP Basic
    ClientSecretBasic,
    /// Shared secret in the form body, JWKS sent at registration
    ClientSecretPost,
}

#[derive(clap::Args)]
pub struct RegisterArgs {
    /// Token endpoint auth method to register
    #[arg(long, default_value = "private-key-jwt")]
    pub auth_method: AuthMethodArg,
}

#[derive(clap::Args)]
pub struct VerifyArgs {
    /// Compact JWS client assertion
    pub assertion: String,
}

#[derive(clap::Args)]
pub struct TokenArgs {
    /// Print only the raw access token
    #[arg(long)]
    pub raw: bool,
}

#[derive(clap::Args)]
pub struct FetchArgs {
    /// Resource type (e.g. Patient)
    pub resource_type: String,
    /// Search parameters as key=value pairs (e.g. family=Smith birthdate=gt1990-01-01)
    pub params: Vec<String>,
    /// Number of results per page
    #[arg(long)]
    pub count: Option<u32>,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
}
