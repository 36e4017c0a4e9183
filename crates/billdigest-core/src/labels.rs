//! Label resolution.
//!
//! Joins the parser registry against the mailbox's labels by name. Matching
//! descriptors get their `label_id`; the matched ids form the active set that
//! drives fetching and extraction.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fetch::with_timeout;
use crate::mailbox::MailApi;
use crate::model::Label;
use crate::registry::ParserRegistry;

/// Label ids that have a registered parser this run.
///
/// Deduplicated; iteration follows registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveLabels {
    ids: Vec<String>,
}

impl ActiveLabels {
    /// Builds a set from ids, dropping duplicates.
    #[must_use]
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for id in ids {
            set.insert(id.into());
        }
        set
    }

    fn insert(&mut self, id: String) {
        if !self.contains(&id) {
            self.ids.push(id);
        }
    }

    /// Returns true if `id` is active.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|active| active == id)
    }

    /// Active ids.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Number of active ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no label is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The first id in `label_ids` that is active, in the caller's order.
    #[must_use]
    pub fn first_active<'a>(&self, label_ids: &'a [String]) -> Option<&'a str> {
        label_ids
            .iter()
            .map(String::as_str)
            .find(|id| self.contains(id))
    }
}

/// Assigns label ids to the registry and returns the active set.
///
/// Descriptors whose label name is not in the mailbox keep `label_id = None`.
/// If two mailbox labels share a name, the later one wins.
pub fn resolve_labels(labels: &[Label], registry: &mut ParserRegistry) -> ActiveLabels {
    let by_name: HashMap<&str, &str> = labels
        .iter()
        .filter(|label| !label.id.is_empty())
        .map(|label| (label.name.as_str(), label.id.as_str()))
        .collect();

    let mut active = ActiveLabels::default();
    for descriptor in registry.iter_mut() {
        descriptor.label_id = by_name
            .get(descriptor.label_name.as_str())
            .map(|id| (*id).to_string());

        match &descriptor.label_id {
            Some(id) => {
                debug!(label = %descriptor.label_name, id = %id, "Resolved label");
                active.insert(id.clone());
            }
            None => debug!(label = %descriptor.label_name, "Label not in mailbox, parser inert"),
        }
    }

    active
}

/// Lists the mailbox labels and resolves the registry against them.
///
/// # Errors
///
/// Returns [`Error::LabelList`] if the listing fails or times out. An empty
/// listing resolves to no active labels.
pub async fn load_active_labels<A: MailApi>(
    api: &A,
    registry: &mut ParserRegistry,
    call_timeout: Duration,
) -> Result<ActiveLabels> {
    let labels = with_timeout(call_timeout, api.list_labels())
        .await
        .map_err(Error::LabelList)?;

    let active = resolve_labels(&labels, registry);
    info!(
        labels = labels.len(),
        parsers = registry.len(),
        active = active.len(),
        "Resolved labels"
    );

    Ok(active)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::model::{BillRecord, MessageDetail};
    use crate::registry::ParserDescriptor;

    fn noop(_: &MessageDetail) -> std::result::Result<BillRecord, ParseError> {
        Ok(BillRecord::new("0", ""))
    }

    fn registry(names: &[&str]) -> ParserRegistry {
        let mut registry = ParserRegistry::new();
        for name in names {
            registry.register(ParserDescriptor::new(*name, *name, noop));
        }
        registry
    }

    #[test]
    fn test_resolve_labels_matches_by_name() {
        let labels = vec![
            Label::new("Electric", "L1"),
            Label::new("Water", "L2"),
            Label::new("INBOX", "INBOX"),
        ];
        let mut registry = registry(&["Water", "Gas", "Electric"]);

        let active = resolve_labels(&labels, &mut registry);

        assert_eq!(active.iter().collect::<Vec<_>>(), vec!["L2", "L1"]);
        let ids: Vec<_> = registry.iter().map(|d| d.label_id.clone()).collect();
        assert_eq!(ids, vec![Some("L2".to_string()), None, Some("L1".to_string())]);
    }

    #[test]
    fn test_resolve_labels_deduplicates() {
        let labels = vec![Label::new("Electric", "L1")];
        let mut registry = registry(&["Electric", "Electric"]);

        let active = resolve_labels(&labels, &mut registry);
        assert_eq!(active.len(), 1);
        assert!(registry.iter().all(|d| d.label_id.as_deref() == Some("L1")));
    }

    #[test]
    fn test_resolve_labels_case_sensitive_and_empty_ids() {
        let labels = vec![Label::new("electric", "L1"), Label::new("Water", "")];
        let mut registry = registry(&["Electric", "Water"]);

        assert!(resolve_labels(&labels, &mut registry).is_empty());
    }

    #[test]
    fn test_first_active_uses_message_order() {
        let active = ActiveLabels::from_ids(["L1", "L2"]);
        let ids = vec!["INBOX".to_string(), "L2".to_string(), "L1".to_string()];
        assert_eq!(active.first_active(&ids), Some("L2"));
        assert_eq!(active.first_active(&["INBOX".to_string()]), None);
        assert_eq!(active.first_active(&[]), None);
    }
}
