use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use tracing::warn;

use tokensign::model::{ClientId, KeyUsage, NewCertRequest, Pin, SOFTWARE_TOKEN_ID};
use tokensign::use_cases::ImportOptions;
use tokensign::{CredentialService, SignerConfig};

#[derive(Parser, Debug)]
#[command(name = "tokensign")]
#[command(about = "Token, key and certificate administration for signing services", version)]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Snapshot file, overrides the configuration
    #[arg(long, global = true)]
    pub key_conf: Option<PathBuf>,

    /// Software token directory, overrides the configuration
    #[arg(long, global = true)]
    pub softtoken_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set the PIN of the software token
    InitSoftwareToken {
        #[arg(long)]
        pin: String,
    },

    /// Print tokens, keys, certificates and requests
    List,

    /// Check a token PIN
    Activate {
        #[arg(long, default_value = SOFTWARE_TOKEN_ID)]
        token: String,

        #[arg(long)]
        pin: String,
    },

    /// Generate a key pair; prints the key id and public key (hex)
    GenerateKey {
        #[arg(long, default_value = SOFTWARE_TOKEN_ID)]
        token: String,

        #[arg(long)]
        pin: String,

        #[arg(long)]
        label: Option<String>,
    },

    /// Register a certificate request; prints the request id
    CertRequest {
        #[arg(long)]
        key: String,

        /// Member the certificate will be bound to (INSTANCE/CLASS/CODE)
        #[arg(long)]
        member: Option<String>,

        #[arg(long)]
        subject: String,

        #[arg(long, default_value = "signing")]
        usage: UsageArg,
    },

    /// Import a DER certificate; prints the certificate id
    ImportCert {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        member: Option<String>,

        /// Overrides the key usage extension of the certificate
        #[arg(long)]
        usage: Option<UsageArg>,

        /// Import without activating
        #[arg(long)]
        inactive: bool,
    },

    /// Print the key and certificate that would sign for a member
    FindSigningKey {
        #[arg(long)]
        member: String,
    },

    /// Sign a hex digest read from stdin; prints the signature (hex)
    Sign {
        #[command(flatten)]
        target: SignTarget,

        /// Token to log in to when signing for a member
        #[arg(long, default_value = SOFTWARE_TOKEN_ID)]
        token: String,

        #[arg(long)]
        pin: String,
    },

    DeleteKey {
        #[arg(long)]
        key: String,

        /// Also delete the key from its token; needs the PIN
        #[arg(long, requires = "pin")]
        from_token: bool,

        #[arg(long)]
        pin: Option<String>,
    },

    DeleteCert {
        #[arg(long)]
        cert: String,
    },

    DeleteCertRequest {
        #[arg(long)]
        request: String,
    },

    SetCertActive {
        #[arg(long)]
        cert: String,

        #[arg(long, action = clap::ArgAction::Set)]
        active: bool,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SignTarget {
    #[arg(long)]
    key: Option<String>,

    #[arg(long)]
    member: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum UsageArg {
    Signing,
    Authentication,
}

impl From<UsageArg> for KeyUsage {
    fn from(arg: UsageArg) -> Self {
        match arg {
            UsageArg::Signing => KeyUsage::Signing,
            UsageArg::Authentication => KeyUsage::Authentication,
        }
    }
}

fn parse_pin(pin: &str) -> anyhow::Result<Pin> {
    Pin::from_str(pin).context("invalid PIN")
}

fn parse_member(member: &str) -> anyhow::Result<ClientId> {
    member
        .parse()
        .with_context(|| format!("invalid member identifier '{member}'"))
}

fn load_config(cli: &Cli) -> anyhow::Result<SignerConfig> {
    let mut config = match &cli.config {
        Some(path) => SignerConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => SignerConfig::default(),
    };
    if let Some(path) = &cli.key_conf {
        config.key_conf_path = path.clone();
    }
    if let Some(dir) = &cli.softtoken_dir {
        config.software_token_dir = dir.clone();
    }
    Ok(config)
}

fn print_registry(service: &CredentialService) {
    for token in service.list_tokens() {
        println!(
            "token {} {} available={} active={} status={:?}",
            token.id,
            token.friendly_name.as_deref().unwrap_or("-"),
            token.available,
            token.active,
            token.status
        );
        for key in &token.keys {
            let usage = key.usage.map_or("-", KeyUsage::as_str);
            println!(
                "  key {} usage={usage} available={} label={}",
                key.id,
                key.available,
                key.label.as_deref().unwrap_or("-")
            );
            for cert in &key.certs {
                let member = cert
                    .member_id
                    .as_ref()
                    .map_or_else(|| "-".to_string(), ClientId::to_string);
                println!(
                    "    cert {} member={member} active={} status={}",
                    cert.id, cert.active, cert.status
                );
            }
            for request in &key.cert_requests {
                println!("    request {} subject={}", request.id, request.subject_name);
            }
        }
    }
}

fn read_digest() -> anyhow::Result<Vec<u8>> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read digest from stdin")?;
    hex::decode(input.trim()).context("digest on stdin is not hex")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(io::stderr)
        .init();

    let config = load_config(&cli)?;
    let service =
        CredentialService::from_config(&config).context("failed to start credential service")?;

    match cli.command {
        Commands::InitSoftwareToken { pin } => {
            service
                .initialize_software_token(&parse_pin(&pin)?)
                .context("failed to initialize software token")?;
        }

        Commands::List => print_registry(&service),

        Commands::Activate { token, pin } => {
            service
                .activate_token(&token, &parse_pin(&pin)?)
                .with_context(|| format!("failed to activate token '{token}'"))?;
            println!("token {token} activated");
        }

        Commands::GenerateKey { token, pin, label } => {
            service
                .activate_token(&token, &parse_pin(&pin)?)
                .with_context(|| format!("failed to activate token '{token}'"))?;
            let key = service
                .generate_key(&token, label.as_deref())
                .context("failed to generate key")?;
            let public_key = key.public_key.as_deref().map(hex::encode).unwrap_or_default();
            println!("{} {public_key}", key.id);
        }

        Commands::CertRequest {
            key,
            member,
            subject,
            usage,
        } => {
            let member = member.as_deref().map(parse_member).transpose()?;
            let outcome = service
                .request_certificate(&key, usage.into(), NewCertRequest::new(member, subject))
                .context("failed to register certificate request")?;
            if !outcome.is_new() {
                warn!("An equivalent request already exists");
            }
            println!("{}", outcome.id());
        }

        Commands::ImportCert {
            file,
            member,
            usage,
            inactive,
        } => {
            let der = fs::read(&file)
                .with_context(|| format!("failed to read certificate {}", file.display()))?;
            let options = ImportOptions {
                member_id: member.as_deref().map(parse_member).transpose()?,
                usage: usage.map(Into::into),
                active: !inactive,
                ..ImportOptions::default()
            };
            let cert = service
                .import_certificate(&der, options)
                .context("failed to import certificate")?;
            println!("{}", cert.id);
        }

        Commands::FindSigningKey { member } => {
            let member = parse_member(&member)?;
            let Some(candidate) = service.find_signing_key(&member) else {
                bail!("no signing key for member '{member}'");
            };
            println!("{} {}", candidate.key_id, candidate.cert.id);
        }

        Commands::Sign { target, token, pin } => {
            let pin = parse_pin(&pin)?;
            let digest = read_digest()?;
            let signature = match (target.key, target.member) {
                (Some(key), _) => {
                    let token = service.registry().get_token_for_key(&key)?;
                    service.activate_token(&token.id, &pin)?;
                    service.sign(&key, &digest).context("failed to sign")?
                }
                (None, Some(member)) => {
                    let member = parse_member(&member)?;
                    service.activate_token(&token, &pin)?;
                    service
                        .sign_for_member(&member, &digest)
                        .context("failed to sign")?
                        .signature
                }
                (None, None) => bail!("either --key or --member is required"),
            };
            println!("{}", hex::encode(signature));
        }

        Commands::DeleteKey {
            key,
            from_token,
            pin,
        } => {
            if let Some(pin) = pin {
                let token = service.registry().get_token_for_key(&key)?;
                service.activate_token(&token.id, &parse_pin(&pin)?)?;
            }
            service
                .delete_key(&key, from_token)
                .with_context(|| format!("failed to delete key '{key}'"))?;
        }

        Commands::DeleteCert { cert } => {
            service
                .delete_certificate(&cert)
                .with_context(|| format!("failed to delete certificate '{cert}'"))?;
        }

        Commands::DeleteCertRequest { request } => {
            service
                .delete_cert_request(&request)
                .with_context(|| format!("failed to delete certificate request '{request}'"))?;
        }

        Commands::SetCertActive { cert, active } => {
            service
                .set_certificate_active(&cert, active)
                .with_context(|| format!("failed to update certificate '{cert}'"))?;
        }
    }

    if !config.autosave {
        service.persist().context("failed to write snapshot")?;
    }
    Ok(())
}
