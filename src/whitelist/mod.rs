use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::audit::{AuditRecord, AuditSink};
use crate::domain::{
    TransactionEvent, WhitelistDecision, WhitelistEntry, WhitelistId, WhitelistType,
    WhitelistUpsert,
};
use crate::error::{FraudError, FraudResult};
use crate::storage::{WhitelistStore, LIST_LIMIT};

/// Resolves bypass exceptions for events and rules.
pub struct WhitelistResolver {
    store: Arc<dyn WhitelistStore>,
    audit: Arc<dyn AuditSink>,
}

impl WhitelistResolver {
    pub fn new(store: Arc<dyn WhitelistStore>, audit: Arc<dyn AuditSink>) -> Self {
        WhitelistResolver { store, audit }
    }

    /// Event-level decision.
    ///
    /// Checks the customer, then the destination account, then the
    /// merchant category. The first unexpired entry wins.
    pub async fn evaluate(&self, event: &TransactionEvent) -> FraudResult<WhitelistDecision> {
        let candidates = [
            (WhitelistType::Customer, Some(event.customer_no.as_str())),
            (WhitelistType::Iban, event.to_account.as_deref()),
            (WhitelistType::Mcc, event.mcc.as_deref()),
        ];

        for (entry_type, value) in candidates {
            let Some(value) = value.filter(|v| !v.is_empty()) else {
                continue;
            };
            if let Some(entry) = self.find_active(entry_type, value).await? {
                return Ok(WhitelistDecision::matched(&entry));
            }
        }

        Ok(WhitelistDecision::inactive())
    }

    /// Whether a rule id is suppressed by an unexpired `RULE_ID` entry.
    pub async fn is_rule_whitelisted(&self, rule_id: &str) -> FraudResult<bool> {
        Ok(self.find_active(WhitelistType::RuleId, rule_id).await?.is_some())
    }

    async fn find_active(
        &self,
        entry_type: WhitelistType,
        value: &str,
    ) -> FraudResult<Option<WhitelistEntry>> {
        let entry = self.store.find_whitelist(entry_type, value).await?;
        let now = Utc::now();
        Ok(entry.filter(|e| !e.is_expired_at(now)))
    }

    /// Create or replace the entry for (type, value).
    pub async fn upsert(&self, upsert: WhitelistUpsert) -> FraudResult<WhitelistEntry> {
        if upsert.value.trim().is_empty() {
            return Err(FraudError::InvalidArgument(
                "whitelist value must not be empty".to_string(),
            ));
        }
        if upsert.created_by.trim().is_empty() {
            return Err(FraudError::InvalidArgument(
                "whitelist creator must not be empty".to_string(),
            ));
        }

        let entry = upsert.into_entry(Utc::now());
        self.store.replace_whitelist(&entry).await?;

        info!(
            id = %entry.id,
            entry_type = %entry.entry_type,
            value = %entry.value,
            hard_bypass = entry.hard_bypass,
            "Whitelist entry upserted"
        );
        self.audit.record(AuditRecord::new(
            entry.created_by.clone(),
            "UPSERT_WHITELIST",
            "WHITELIST",
            entry.id,
            json!({
                "type": entry.entry_type.as_str(),
                "value": entry.value,
                "hardBypass": entry.hard_bypass,
                "reason": entry.reason,
                "ticketRef": entry.ticket_ref,
                "expiresAt": entry.expires_at,
            }),
        ));

        Ok(entry)
    }

    pub async fn delete(&self, id: WhitelistId, actor: &str) -> FraudResult<()> {
        if !self.store.delete_whitelist(id).await? {
            return Err(FraudError::not_found("whitelist entry", id));
        }

        info!(id = %id, actor, "Whitelist entry deleted");
        self.audit.record(AuditRecord::new(
            actor,
            "DELETE_WHITELIST",
            "WHITELIST",
            id,
            json!({}),
        ));

        Ok(())
    }

    /// Newest entries first, optionally filtered by type.
    pub async fn list(&self, entry_type: Option<WhitelistType>) -> FraudResult<Vec<WhitelistEntry>> {
        Ok(self.store.list_whitelist(entry_type, LIST_LIMIT).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::domain::CustomerNo;
    use crate::storage::MemoryStore;
    use chrono::{DateTime, Duration};

    fn resolver() -> (WhitelistResolver, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        (
            WhitelistResolver::new(Arc::new(MemoryStore::new()), audit.clone()),
            audit,
        )
    }

    fn upsert(
        entry_type: WhitelistType,
        value: &str,
        hard_bypass: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> WhitelistUpsert {
        WhitelistUpsert {
            entry_type,
            value: value.to_string(),
            hard_bypass,
            reason: "known counterparty".to_string(),
            created_by: "ops".to_string(),
            ticket_ref: Some("OPS-1".to_string()),
            expires_at,
        }
    }

    fn event() -> TransactionEvent {
        TransactionEvent::new(CustomerNo::new("C1"), 100)
            .with_to_account("TR990001")
            .with_mcc("7995")
    }

    #[tokio::test]
    async fn test_upsert_then_evaluate_customer() {
        let (resolver, audit) = resolver();
        resolver
            .upsert(upsert(WhitelistType::Customer, "C1", true, None))
            .await
            .unwrap();

        let decision = resolver.evaluate(&event()).await.unwrap();
        assert!(decision.active);
        assert_eq!(decision.match_type, Some(WhitelistType::Customer));
        assert_eq!(decision.match_value, "C1");
        assert_eq!(audit.actions(), vec!["UPSERT_WHITELIST"]);
    }

    #[tokio::test]
    async fn test_lookup_order_prefers_customer() {
        let (resolver, _) = resolver();
        resolver
            .upsert(upsert(WhitelistType::Mcc, "7995", false, None))
            .await
            .unwrap();
        resolver
            .upsert(upsert(WhitelistType::Iban, "TR990001", false, None))
            .await
            .unwrap();

        let decision = resolver.evaluate(&event()).await.unwrap();
        assert_eq!(decision.match_type, Some(WhitelistType::Iban));

        resolver
            .upsert(upsert(WhitelistType::Customer, "C1", true, None))
            .await
            .unwrap();
        let decision = resolver.evaluate(&event()).await.unwrap();
        assert_eq!(decision.match_type, Some(WhitelistType::Customer));
    }

    #[tokio::test]
    async fn test_expired_entry_is_skipped() {
        let (resolver, _) = resolver();
        let past = Utc::now() - Duration::minutes(1);
        resolver
            .upsert(upsert(WhitelistType::Customer, "C1", true, Some(past)))
            .await
            .unwrap();
        resolver
            .upsert(upsert(WhitelistType::Mcc, "7995", false, None))
            .await
            .unwrap();

        let decision = resolver.evaluate(&event()).await.unwrap();
        assert_eq!(decision.match_type, Some(WhitelistType::Mcc));
        assert!(!decision.hard_bypass);
    }

    #[tokio::test]
    async fn test_no_match_is_inactive() {
        let (resolver, _) = resolver();
        assert_eq!(
            resolver.evaluate(&event()).await.unwrap(),
            WhitelistDecision::inactive()
        );
    }

    #[tokio::test]
    async fn test_rule_whitelist() {
        let (resolver, _) = resolver();
        resolver
            .upsert(upsert(WhitelistType::RuleId, "kw_betting", false, None))
            .await
            .unwrap();

        assert!(resolver.is_rule_whitelisted("kw_betting").await.unwrap());
        assert!(!resolver.is_rule_whitelisted("betting_mcc").await.unwrap());
        // Rule entries never produce an event-level decision.
        assert!(!resolver.evaluate(&event()).await.unwrap().active);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let (resolver, audit) = resolver();
        let err = resolver.delete(WhitelistId::new(), "ops").await.unwrap_err();

        assert!(matches!(err, FraudError::NotFound { .. }));
        assert!(audit.actions().is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let (resolver, audit) = resolver();
        let entry = resolver
            .upsert(upsert(WhitelistType::Customer, "C1", true, None))
            .await
            .unwrap();
        resolver
            .upsert(upsert(WhitelistType::Mcc, "7995", true, None))
            .await
            .unwrap();

        assert_eq!(resolver.list(None).await.unwrap().len(), 2);
        assert_eq!(
            resolver.list(Some(WhitelistType::Mcc)).await.unwrap().len(),
            1
        );

        resolver.delete(entry.id, "ops").await.unwrap();
        assert_eq!(resolver.list(None).await.unwrap().len(), 1);
        assert_eq!(audit.actions().last().map(String::as_str), Some("DELETE_WHITELIST"));
    }

    #[tokio::test]
    async fn test_empty_value_rejected() {
        let (resolver, _) = resolver();
        let err = resolver
            .upsert(upsert(WhitelistType::Customer, " ", true, None))
            .await
            .unwrap_err();
        assert!(matches!(err, FraudError::InvalidArgument(_)));
    }
}
