//! Signing request types: signature placements and email recipients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One signature placement, expressed in percentages of the page with a
/// top-left origin (the way the browser UI captures it)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureField {
    /// 1-based page index
    pub page: u32,
    pub x_percent: f64,
    pub y_percent: f64,
    pub width_percent: f64,
    /// `data:image/png;base64,...` or a bare base64 payload
    #[serde(alias = "imageUrl")]
    pub image_data_url: String,
    pub signed_at: DateTime<Utc>,
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub signer_name: Option<String>,
    #[serde(default, alias = "email", skip_serializing_if = "Option::is_none")]
    pub signer_email: Option<String>,
}

/// How a recipient receives the finished document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientRole {
    Signer,
    Cc,
    Bcc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "type")]
    pub role: RecipientRole,
}

/// Recipients partitioned into envelope headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecipients {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

impl ResolvedRecipients {
    /// Partition explicit recipients by role. Falls back to `defaults` (as
    /// To addresses) when the explicit list is empty.
    pub fn resolve(recipients: &[Recipient], defaults: &[String]) -> Self {
        if recipients.is_empty() {
            return Self {
                to: defaults.to_vec(),
                cc: Vec::new(),
                bcc: Vec::new(),
            };
        }

        let pick = |role: RecipientRole| {
            recipients
                .iter()
                .filter(|r| r.role == role)
                .map(|r| r.email.trim().to_string())
                .collect::<Vec<_>>()
        };

        Self {
            to: pick(RecipientRole::Signer),
            cc: pick(RecipientRole::Cc),
            bcc: pick(RecipientRole::Bcc),
        }
    }

    pub fn len(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One signing operation. Transient: consumed once by the compositor and
/// the notifier, never persisted as a struct.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    pub source_pdf: Vec<u8>,
    pub signatures: Vec<SignatureField>,
    pub document_name: String,
    pub recipients: Vec<Recipient>,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
}

impl SigningRequest {
    /// Display names of signers that supplied one, in placement order
    pub fn signer_names(&self) -> Vec<String> {
        self.signatures
            .iter()
            .filter_map(|s| s.signer_name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    }
}
