//! Configuration loading and placeholder resolution for preview environments.
//!
//! Config documents under `.prenv/` are plain JSON. String values of the form
//! `${source:key}` are resolved at load time from one of three sources:
//!
//! - `${tf:name}`: an output of the remote Terraform state
//! - `${ssm:/path}`: a secret parameter
//! - `${env:NAME}`: a variable of the explicit [`Environment`] context
//!
//! # Usage
//!
//! ```no_run
//! use prenv_config::{loader, AwsCliParameterStore, Environment, Resolver, StateOutputs};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let outputs = StateOutputs::fetch("terraform.tfstate").await?;
//! let env = Environment::from_process();
//! let store = AwsCliParameterStore;
//!
//! let raw = loader::load(".prenv/task_definition.json")?;
//! let resolved = Resolver::new(&outputs, &store, &env).resolve(&raw).await?;
//! loader::write_document(&resolved, ".prenv/deployment_config.json")?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ecs;
pub mod environment;
pub mod error;
pub mod loader;
pub mod outputs;
pub mod parameters;
pub mod resolver;

pub use ecs::{DnsConfig, EcsConfig, PublicIp};
pub use environment::{Environment, BINDING_PREFIX};
pub use error::{ConfigError, KeyProblem, ParameterError, ResolveError};
pub use outputs::StateOutputs;
pub use parameters::{assume_role, AwsCliParameterStore, Credentials, ParameterStore};
pub use resolver::{Placeholder, Resolver, Source};
