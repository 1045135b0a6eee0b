// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Command-line and environment configuration.

use crate::account::ProvisioningPolicy;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Seamless wallet backend.
#[derive(Parser, Debug)]
#[command(name = "seamless-wallet")]
#[command(about = "Seamless wallet: balances, free rounds and idempotent round transactions", long_about = None)]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "WALLET_LOG", default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON-RPC endpoint over HTTP
    Serve(ServeArgs),
    /// Replay a CSV of wallet operations and print the resulting accounts
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "WALLET_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    #[command(flatten)]
    pub provisioning: ProvisioningArgs,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,caller,tx,withdraw,deposit,free_rounds
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Number of worker threads; operations of one caller stay on one worker
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: u16,

    #[command(flatten)]
    pub provisioning: ProvisioningArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningMode {
    /// Fixed starting balance and free rounds (see --initial-balance)
    Fixed,
    /// Demo seed: 35000 balance, 2 free rounds
    Demo,
    /// Demo seed drawn at random per account
    Random,
}

/// How accounts seen for the first time are initialized.
#[derive(Args, Debug, Clone, Copy)]
pub struct ProvisioningArgs {
    #[arg(
        long = "provisioning",
        env = "WALLET_PROVISIONING",
        value_enum,
        default_value_t = ProvisioningMode::Fixed
    )]
    pub mode: ProvisioningMode,

    /// Starting balance for `fixed` provisioning, in minor units
    #[arg(long, env = "WALLET_INITIAL_BALANCE", default_value_t = 0)]
    pub initial_balance: i64,

    /// Starting free rounds for `fixed` provisioning
    #[arg(long, env = "WALLET_INITIAL_FREE_ROUNDS", default_value_t = 0)]
    pub initial_free_rounds: i64,
}

impl ProvisioningArgs {
    pub fn policy(&self) -> ProvisioningPolicy {
        match self.mode {
            ProvisioningMode::Fixed => {
                ProvisioningPolicy::fixed(self.initial_balance, self.initial_free_rounds)
            }
            ProvisioningMode::Demo => ProvisioningPolicy::demo_fixed(),
            ProvisioningMode::Random => ProvisioningPolicy::demo_randomized(),
        }
    }
}
