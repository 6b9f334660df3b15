//! # SAS Issuer
//!
//! A command line front end for [`sas_credentials`]. It resolves the storage
//! account connection string from flags, the environment or
//! `appsettings.json`, issues the requested shared access signature and
//! prints it to stdout. Logs go to stderr.
//!
//! ## Usage
//!
//! ```text
//! sas-issuer blob --container demo --blob myfile.txt --backdate-minutes 5
//! sas-issuer account --services b --resource-types sco --permissions rl --lifetime-minutes 600
//! sas-issuer connection-string --services bt
//! sas-issuer delegated --container demo --blob myfile.txt --token "$TOKEN"
//! ```

pub mod cli;
pub mod settings;

pub use cli::{Cli, Command};
pub use settings::Settings;
