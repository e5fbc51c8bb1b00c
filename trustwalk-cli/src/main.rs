//! # Trust Walk CLI
//!
//! This crate provides a CLI interface to use the `trustwalk` library.

#![warn(trivial_casts)]
#![deny(
	absolute_paths_not_starting_with_crate, deprecated, future_incompatible, missing_docs,
	nonstandard_style, unreachable_code, unreachable_patterns
)]
#![forbid(unsafe_code)]
#![deny(
	// Complexity
 	clippy::unnecessary_cast,
	clippy::needless_question_mark,
	// Pedantic
 	clippy::cast_lossless,
 	clippy::cast_possible_wrap,
	// Perf
	clippy::redundant_clone,
	// Restriction
 	clippy::panic,
	// Style
 	clippy::let_and_return,
 	clippy::needless_borrow
)]

mod cli;
mod fs;

use clap::Parser;
use cli::*;
use dotenv::dotenv;
use env_logger::{init_from_env, Env};
use fs::load_config;
use log::info;
use trustwalk::{error::TrustError, RecommenderConfig};

#[tokio::main]
async fn main() -> Result<(), TrustError> {
	dotenv().ok();
	init_from_env(Env::default().filter_or("LOG_LEVEL", "info"));
	let mut config: RecommenderConfig = load_config()?;
	config.validate()?;

	match Cli::parse().mode {
		Mode::Apply(apply_data) => handle_apply(&config, apply_data)?,
		Mode::Gossip(gossip_data) => handle_gossip(&config, gossip_data)?,
		Mode::Init => handle_init(&config)?,
		Mode::Interact(interact_data) => handle_interact(&config, interact_data)?,
		Mode::Rank => handle_rank(&config)?,
		Mode::Show => info!("Recommender config:\n{:#?}", config),
		Mode::Simulate(simulate_data) => handle_simulate(&config, simulate_data).await?,
		Mode::Trust(trust_data) => handle_trust(&config, trust_data)?,
		Mode::Update(update_data) => handle_update(&mut config, update_data)?,
	};

	Ok(())
}
