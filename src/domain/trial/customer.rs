//! Customer registry entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::foundation::{CustomerId, Timestamp};

/// External customer, created once and afterwards only annotated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: CustomerId,
    pub email: Option<String>,
    pub created_at: Timestamp,
    pub acquisition_tags: BTreeSet<String>,
}

impl Customer {
    pub fn new(
        customer_id: CustomerId,
        email: Option<String>,
        acquisition_tags: BTreeSet<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            customer_id,
            email,
            created_at,
            acquisition_tags,
        }
    }

    /// Adds tags; returns true when anything new was added.
    pub fn annotate(&mut self, tags: &BTreeSet<String>) -> bool {
        let before = self.acquisition_tags.len();
        self.acquisition_tags.extend(tags.iter().cloned());
        self.acquisition_tags.len() != before
    }
}
