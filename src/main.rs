use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
mod input;
use ecekit::{
    AgreementKeyPair, KeyMaterial, Params, Storage, SymmetricKey, base64url, decrypt,
    default_storage, encrypt, generate_salt,
};
use std::path::PathBuf;

/// Message parameters, from a JSON file and/or individual flags.
///
/// Flags override values read from `--params`.
#[derive(Debug, clap::Args)]
struct ParamArgs {
    /// JSON file holding the message parameters (camelCase keys)
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// 16-byte salt, base64url
    #[arg(long, env = "ECE_SALT")]
    salt: Option<String>,

    /// Explicit 16-byte key, base64url
    #[arg(long, env = "ECE_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Name of a key in the key file
    #[arg(long, env = "ECE_KEYID")]
    keyid: Option<String>,

    /// Peer's P-256 public key, base64url
    #[arg(long, env = "ECE_DH")]
    dh: Option<String>,

    /// Authentication secret, base64url
    #[arg(long, env = "ECE_AUTH_SECRET", hide_env_values = true)]
    auth_secret: Option<String>,

    /// Record size (default: 4096)
    #[arg(long)]
    rs: Option<usize>,

    /// Width of the padding length prefix, 1 or 2 (default: 2)
    #[arg(long)]
    pad_size: Option<u8>,
}

impl ParamArgs {
    fn to_params(&self) -> Result<Params> {
        let mut params = match &self.params {
            Some(path) => {
                let data = std::fs::read(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_slice::<Params>(&data)
                    .with_context(|| format!("malformed parameters in {}", path.display()))?
            }
            None => Params::default(),
        };

        if let Some(salt) = &self.salt {
            params.salt = salt.clone();
        }
        if self.key.is_some() {
            params.key = self.key.clone();
        }
        if self.keyid.is_some() {
            params.keyid = self.keyid.clone();
        }
        if self.dh.is_some() {
            params.dh = self.dh.clone();
        }
        if self.auth_secret.is_some() {
            params.auth_secret = self.auth_secret.clone();
        }
        if self.rs.is_some() {
            params.rs = self.rs;
        }
        if self.pad_size.is_some() {
            params.pad_size = self.pad_size;
        }

        if params.salt.is_empty() {
            bail!("a salt is required: pass --salt, set ECE_SALT, or use --params");
        }
        for (name, value) in [
            ("salt", Some(&params.salt)),
            ("key", params.key.as_ref()),
            ("dh", params.dh.as_ref()),
            ("auth secret", params.auth_secret.as_ref()),
        ] {
            if value.is_some_and(|v| !base64url::validate(v.trim_end_matches('='))) {
                bail!("{name} is not valid base64url");
            }
        }

        Ok(params)
    }
}

fn resolve_storage(path: Option<PathBuf>) -> Result<Storage> {
    match path {
        Some(p) => Ok(Storage::new(p)),
        None => default_storage(),
    }
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Parser)]
#[command(name = "ecekit")]
#[command(
    version,
    about = "Encrypted Content-Encoding (aesgcm) for files and pipes."
)]
struct Cli {
    /// Path to the key file
    #[arg(long, global = true, value_name = "PATH", env = "ECEKIT_KEYS")]
    keys: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ECEKIT_LOG", default_value = "warn")]
    log_level: String,

    /// Log format (json, text)
    #[arg(long, global = true, env = "ECEKIT_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encrypts a payload
    Encrypt {
        #[command(flatten)]
        params: ParamArgs,

        /// Total bytes of padding to add
        #[arg(long)]
        pad: Option<usize>,

        /// Input file (default: stdin)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Write the ciphertext as base64url text
        #[arg(long, default_value_t = false)]
        base64: bool,
    },

    /// Decrypts a payload
    Decrypt {
        #[command(flatten)]
        params: ParamArgs,

        /// Input file (default: stdin)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Read the ciphertext as base64url text
        #[arg(long, default_value_t = false)]
        base64: bool,
    },

    /// Prints a fresh random salt
    Salt,

    /// Generates a key and saves it to the key file
    #[command(arg_required_else_help = true)]
    Keygen {
        id: String,

        /// Generate a P-256 key pair instead of a 16-byte key
        #[arg(long, default_value_t = false)]
        dh: bool,

        /// Label mixed into the ECDH context
        #[arg(long, requires = "dh")]
        label: Option<String>,

        /// Overwrite an existing key
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Prints the public key of a saved key pair
    #[command(arg_required_else_help = true)]
    Pubkey { id: String },

    /// Lists saved keys
    List,

    /// Removes a key from the key file
    #[command(arg_required_else_help = true)]
    Remove { id: String },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    init_logging(&args.log_level, &args.log_format);

    match args.command {
        Commands::Encrypt {
            params,
            pad,
            input,
            output,
            base64,
        } => {
            let mut params = params.to_params()?;
            params.pad = pad.or(params.pad);
            let store = resolve_storage(args.keys)?.load_store()?;

            let plaintext = input::read_input(input.as_ref())?;
            let encrypted = encrypt(&plaintext, &params, &store)?;
            tracing::info!(
                input = plaintext.len(),
                output = encrypted.len(),
                "encrypted"
            );

            if base64 {
                let text = format!("{}\n", base64url::encode(&encrypted));
                input::write_output(output.as_ref(), text.as_bytes())?;
            } else {
                input::write_output(output.as_ref(), &encrypted)?;
            }
        }
        Commands::Decrypt {
            params,
            input,
            output,
            base64,
        } => {
            let params = params.to_params()?.without_pad();
            let store = resolve_storage(args.keys)?.load_store()?;

            let mut ciphertext = input::read_input(input.as_ref())?;
            if base64 {
                let text = String::from_utf8(ciphertext).context("input is not base64url text")?;
                ciphertext = base64url::decode(text.trim(), "input")?;
            }
            let decrypted = decrypt(&ciphertext, &params, &store)?;
            tracing::info!(
                input = ciphertext.len(),
                output = decrypted.len(),
                "decrypted"
            );

            input::write_output(output.as_ref(), &decrypted)?;
        }
        Commands::Salt => {
            println!("{}", base64url::encode(generate_salt()?));
        }
        Commands::Keygen {
            id,
            dh,
            label,
            force,
        } => {
            let storage = resolve_storage(args.keys)?;
            let mut keys = storage.read_keys()?;
            if keys.contains(&id) && !force {
                bail!("key '{id}' already exists");
            }

            if dh {
                let pair = AgreementKeyPair::generate()?;
                keys.insert_agreement(&id, &pair, label.as_deref());
                storage.write_keys(&keys)?;
                println!("{}", base64url::encode(pair.public_key_bytes()));
            } else {
                keys.insert_symmetric(&id, &SymmetricKey::generate()?);
                storage.write_keys(&keys)?;
                println!("stored key '{id}'");
            }
            tracing::info!(path = %storage.path().display(), id = %id, dh, "saved key");
        }
        Commands::Pubkey { id } => {
            let store = resolve_storage(args.keys)?.load_store()?;
            match &*store.lookup(&id)? {
                KeyMaterial::Agreement(pair) => {
                    println!("{}", base64url::encode(pair.public_key_bytes()))
                }
                KeyMaterial::Symmetric(_) => bail!("key '{id}' is not a P-256 key pair"),
            }
        }
        Commands::List => {
            let keys = resolve_storage(args.keys)?.read_keys()?;
            if keys.is_empty() {
                println!("No keys stored.");
                return Ok(());
            }

            let id_width = keys
                .entries()
                .map(|(id, _)| id.len())
                .chain(std::iter::once("Id".len()))
                .max()
                .unwrap_or_default();

            println!("{:<id_width$}  {:<6}  Created", "Id", "Type");
            println!("{:-<id_width$}  {:-<6}  {:-<7}", "", "", "");

            for (id, entry) in keys.entries() {
                println!(
                    "{:<id_width$}  {:<6}  {}",
                    id,
                    entry.kind(),
                    entry.created()
                );
            }
        }
        Commands::Remove { id } => {
            let storage = resolve_storage(args.keys)?;
            let mut keys = storage.read_keys()?;
            if !keys.remove(&id) {
                bail!("key '{id}' not found");
            }
            storage.write_keys(&keys)?;
            println!("key '{id}' removed");
        }
    }

    Ok(())
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let layer = fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}
