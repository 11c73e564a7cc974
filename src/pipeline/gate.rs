// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Operator confirmation gate.
//!
//! Runs that mutate a shared target environment need an explicit yes from the
//! operator first. The decision is taken once, before validation starts.

use inquire::Confirm;
use tracing::{info, instrument, warn};

/// Decide whether a mutating run may proceed.
pub trait Operator {
    /// Ask operator to confirm run.
    ///
    /// The `details` describe what the run is about to do.
    fn confirm(&self, message: &str, details: &str) -> bool;
}

/// Prompt operator on the terminal through inquire.
#[derive(Debug, Default, Clone)]
pub struct InquireOperator;

impl InquireOperator {
    pub fn new() -> Self {
        Self
    }
}

impl Operator for InquireOperator {
    /// Prompt for confirmation, defaulting to no.
    ///
    /// A prompt that cannot be answered, e.g., no terminal attached or
    /// interrupted with Ctrl-C, counts as a decline.
    #[instrument(skip(self, details), level = "debug")]
    fn confirm(&self, message: &str, details: &str) -> bool {
        info!("{details}");
        match Confirm::new(message).with_default(false).prompt() {
            Ok(answer) => answer,
            Err(error) => {
                warn!("cannot prompt for confirmation: {error}");
                false
            }
        }
    }
}

/// Answer yes to every confirmation.
#[derive(Debug, Default, Clone)]
pub struct AssumeYes;

impl Operator for AssumeYes {
    fn confirm(&self, message: &str, _details: &str) -> bool {
        info!("{message} yes (assumed)");
        true
    }
}
