// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod branch;
pub mod build;
pub mod containers;
pub mod init;
pub mod locate;
pub mod log;
pub mod show;

pub use branch::branch_command;
pub use build::{BuildArgs, build_command};
pub use containers::containers_command;
pub use init::init_command;
pub use locate::{LocateArgs, locate_command};
pub use log::log_command;
pub use show::show_command;
