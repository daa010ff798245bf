//! Borrow request data structures as received from the equipment backend

use serde::{Deserialize, Serialize};

/// One equipment line of a borrow request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub borrow_request_item_id: String,
    pub equipment_type_id: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Number of units borrowed on this line
    pub quantity: u32,
}

/// Basic borrower identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Borrower {
    pub id: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Represents a borrow request to be scored for anomalousness.
///
/// Timestamps are kept as the strings the backend sent. They are parsed during
/// feature extraction so a bad value rejects only this transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowTransaction {
    /// Unique borrow request identifier
    pub borrow_request_id: String,

    /// When the request was created (ISO 8601, with or without offset)
    pub created_at: String,

    /// When the equipment is expected back; may precede `created_at`
    pub expected_return_at: String,

    pub borrower: Borrower,

    /// Borrowed equipment lines
    #[serde(default)]
    pub equipments: Vec<Equipment>,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub purpose: String,
}

impl BorrowTransaction {
    /// Create a transaction with a placeholder borrower and no equipment
    pub fn new(borrow_request_id: &str, created_at: &str, expected_return_at: &str) -> Self {
        Self {
            borrow_request_id: borrow_request_id.to_string(),
            created_at: created_at.to_string(),
            expected_return_at: expected_return_at.to_string(),
            borrower: Borrower {
                id: String::new(),
                first_name: String::new(),
                middle_name: None,
                last_name: String::new(),
                avatar_url: None,
            },
            equipments: Vec::new(),
            location: String::new(),
            purpose: String::new(),
        }
    }

    /// Add an equipment line with the given quantity
    pub fn with_equipment(mut self, name: &str, quantity: u32) -> Self {
        let line = self.equipments.len();
        self.equipments.push(Equipment {
            borrow_request_item_id: format!("{}-{}", self.borrow_request_id, line),
            equipment_type_id: format!("type-{line}"),
            name: name.to_string(),
            brand: None,
            model: None,
            image_url: None,
            quantity,
        });
        self
    }
}
