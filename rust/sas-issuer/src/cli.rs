use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use sas_credentials::delegation::{HttpDelegationAuthority, StaticToken};
use sas_credentials::{
    AccountIdentity, AccountPermissions, AccountScope, BlobPermissions, DelegationKeyBroker,
    Protocol, ResourceScope, ResourceTypes, Service, Services, TimeWindow, WindowPolicy,
};
use tracing::info;

use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "sas-issuer")]
#[command(bin_name = "sas-issuer")]
#[command(about = "Issue shared access signatures for blob storage", long_about = None)]
pub struct Cli {
    /// Storage account connection string, overriding the settings file
    #[arg(long, env = "STORAGE_CONNECTION_STRING", hide_env_values = true, global = true)]
    pub connection_string: Option<String>,

    /// Directory containing appsettings.json
    #[arg(long, default_value = ".", global = true)]
    pub config_dir: PathBuf,

    /// Settings overlay to apply, e.g. Development
    #[arg(long, env = "SAS_ISSUER_ENVIRONMENT", global = true)]
    pub environment: Option<String>,

    /// More logging: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct Validity {
    /// Minutes the token stays valid
    #[arg(long, default_value_t = 300)]
    pub lifetime_minutes: i64,

    /// Minutes to move the start into the past
    #[arg(long, default_value_t = 0)]
    pub backdate_minutes: i64,

    /// Accept plain HTTP as well as HTTPS
    #[arg(long)]
    pub allow_http: bool,
}

impl Validity {
    fn window(&self) -> Result<TimeWindow> {
        let policy = WindowPolicy::new().with_backdate(TimeDelta::minutes(self.backdate_minutes));
        Ok(policy.window(Utc::now(), TimeDelta::minutes(self.lifetime_minutes))?)
    }

    fn protocol(&self) -> Protocol {
        if self.allow_http {
            Protocol::HttpsOrHttp
        } else {
            Protocol::HttpsOnly
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Target {
    Blob,
    File,
    Queue,
    Table,
}

impl From<Target> for Service {
    fn from(target: Target) -> Self {
        match target {
            Target::Blob => Service::Blob,
            Target::File => Service::File,
            Target::Queue => Service::Queue,
            Target::Table => Service::Table,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// URI for one blob, signed with the account key
    Blob {
        #[arg(long)]
        container: String,
        #[arg(long)]
        blob: String,
        /// Permission letters, e.g. "rw"
        #[arg(long, default_value = "r")]
        permissions: BlobPermissions,
        #[command(flatten)]
        validity: Validity,
    },
    /// URI for a whole container, signed with the account key
    Container {
        #[arg(long)]
        container: String,
        #[arg(long, default_value = "rl")]
        permissions: BlobPermissions,
        #[command(flatten)]
        validity: Validity,
    },
    /// Account SAS attached to one service endpoint
    Account {
        /// Service letters from "bfqt"
        #[arg(long, default_value = "b")]
        services: Services,
        /// Resource type letters from "sco"
        #[arg(long, default_value = "sco")]
        resource_types: ResourceTypes,
        #[arg(long, default_value = "rl")]
        permissions: AccountPermissions,
        /// Endpoint the token is attached to
        #[arg(long, value_enum, default_value_t = Target::Blob)]
        target: Target,
        #[command(flatten)]
        validity: Validity,
    },
    /// Connection string listing every granted service
    ConnectionString {
        #[arg(long, default_value = "bt")]
        services: Services,
        #[arg(long, default_value = "sco")]
        resource_types: ResourceTypes,
        #[arg(long, default_value = "rl")]
        permissions: AccountPermissions,
        #[command(flatten)]
        validity: Validity,
    },
    /// URI for one blob, signed with a user delegation key
    Delegated {
        #[arg(long)]
        container: String,
        #[arg(long)]
        blob: String,
        #[arg(long, default_value = "r")]
        permissions: BlobPermissions,
        /// OAuth bearer token for the storage account
        #[arg(long, env = "STORAGE_BEARER_TOKEN", hide_env_values = true)]
        token: String,
        /// Minutes the delegation key stays valid
        #[arg(long, default_value_t = 5)]
        key_lifetime_minutes: i64,
        /// Minutes the token stays valid, at most the key lifetime
        #[arg(long, default_value_t = 5)]
        lifetime_minutes: i64,
        #[arg(long)]
        allow_http: bool,
    },
}

impl Cli {
    /// Issue whatever the command asks for and render it.
    pub async fn run(self) -> Result<String> {
        let settings = Settings::load(&self.config_dir, self.environment.as_deref())?;
        let account: AccountIdentity = settings
            .connection_string(self.connection_string.as_deref())?
            .parse()?;
        info!(account = account.name(), "Loaded storage account");

        self.command.run(&account).await
    }
}

impl Command {
    pub async fn run(self, account: &AccountIdentity) -> Result<String> {
        match self {
            Command::Blob {
                container,
                blob,
                permissions,
                validity,
            } => {
                let scope = ResourceScope::blob(container, blob)
                    .with_permissions(permissions)
                    .with_protocol(validity.protocol())
                    .build(validity.window()?)?;
                Ok(account.resource_sas_uri(&scope)?.to_string())
            }
            Command::Container {
                container,
                permissions,
                validity,
            } => {
                let scope = ResourceScope::container(container)
                    .with_permissions(permissions)
                    .with_protocol(validity.protocol())
                    .build(validity.window()?)?;
                Ok(account.resource_sas_uri(&scope)?.to_string())
            }
            Command::Account {
                services,
                resource_types,
                permissions,
                target,
                validity,
            } => {
                let scope = AccountScope::new(services, resource_types)
                    .with_permissions(permissions)
                    .with_protocol(validity.protocol())
                    .build(validity.window()?)?;
                Ok(account.account_sas_uri(&scope, target.into())?.to_string())
            }
            Command::ConnectionString {
                services,
                resource_types,
                permissions,
                validity,
            } => {
                let scope = AccountScope::new(services, resource_types)
                    .with_permissions(permissions)
                    .with_protocol(validity.protocol())
                    .build(validity.window()?)?;
                Ok(account.connection_string(&scope)?.to_string())
            }
            Command::Delegated {
                container,
                blob,
                permissions,
                token,
                key_lifetime_minutes,
                lifetime_minutes,
                allow_http,
            } => {
                let tokens = Arc::new(StaticToken::new(token));
                let authority = HttpDelegationAuthority::for_account(tokens, account);
                let broker = DelegationKeyBroker::new(Arc::new(authority))
                    .with_key_lifetime(TimeDelta::minutes(key_lifetime_minutes))?;

                // The token starts with the key so it can never predate it
                let key = broker.delegation_key(account.name()).await?;
                let lifetime = TimeDelta::minutes(lifetime_minutes);
                let window = TimeWindow::starting_at(key.signed_start(), lifetime)?;
                let protocol = if allow_http {
                    Protocol::HttpsOrHttp
                } else {
                    Protocol::HttpsOnly
                };
                let scope = ResourceScope::blob(container, blob)
                    .with_permissions(permissions)
                    .with_protocol(protocol)
                    .build(window)?;

                Ok(account.delegated_sas_uri(&scope, &key)?.to_string())
            }
        }
    }
}
