// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID newtypes and generation

use crate::clock::Clock;

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
///
/// ```ignore
/// define_id! {
///     /// Doc comment for the ID type.
///     pub struct MyId;
/// }
/// ```
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for one tick invocation.
    ///
    /// Format: UTC compact timestamp plus a random hex suffix, e.g.
    /// `20260801T093015Z-4fa1c2`. The suffix makes two ticks started
    /// within the same second distinguishable.
    pub struct RunId;
}

define_id! {
    /// Identifier of an orchestrator-produced task.
    pub struct TaskId;
}

define_id! {
    /// Budget scope grouping a sequence of ticks.
    #[derive(Default)]
    pub struct MilestoneId;
}

impl RunId {
    /// Generate a fresh run id from the clock plus UUID entropy.
    pub fn generate(clock: &dyn Clock) -> Self {
        let stamp = clock.now().format("%Y%m%dT%H%M%SZ");
        let entropy = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", stamp, &entropy[..6]))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
