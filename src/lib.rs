mod account;
mod certificate;
mod client;
pub mod config;
mod domain;
mod error;
mod helpers;
mod jws;
mod ownership;
pub mod poll;
mod session;
pub mod signing;
pub mod solver;
pub mod storage;
pub mod transport;

pub use account::*;
pub use certificate::Certificate;
pub use certificate::IssuePolicy;
pub use client::*;
pub use config::ClientConfig;
pub use domain::validate_fqdn;
pub use error::*;
pub use helpers::gen_rsa_private_key;
pub use helpers::Identifier;
pub use ownership::*;
pub use poll::PollPolicy;
pub use session::*;
pub use signing::KeyPair;
pub use signing::OpensslProvider;
pub use signing::SigningProvider;
pub use solver::ChallengeInfo;
pub use solver::ChallengeSolver;
pub use solver::ChallengeType;
pub use solver::Proof;
pub use storage::Storage;
pub use transport::Transport;
