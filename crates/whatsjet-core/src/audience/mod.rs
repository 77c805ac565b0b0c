//! Audience Resolver - expands an audience descriptor into contact ids

mod filter;

pub use filter::{Field, FilterExpr, Op};

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use whatsjet_common::types::ContactId;
use whatsjet_common::{Error, Result, TenantContext};
use whatsjet_storage::models::{AudienceDescriptor, Contact};
use whatsjet_storage::repository::ContactRepository;

/// Audience resolver
pub struct AudienceResolver {
    contacts: Arc<dyn ContactRepository>,
}

impl AudienceResolver {
    pub fn new(contacts: Arc<dyn ContactRepository>) -> Self {
        Self { contacts }
    }

    /// Check a descriptor without touching storage
    pub fn validate(descriptor: &AudienceDescriptor) -> Result<()> {
        match descriptor {
            AudienceDescriptor::AllContacts => Ok(()),
            AudienceDescriptor::ContactGroup(group) if group.trim().is_empty() => Err(
                Error::AudienceResolution("Contact group must not be empty".to_string()),
            ),
            AudienceDescriptor::ContactGroup(_) => Ok(()),
            AudienceDescriptor::CustomFilter(expr) => FilterExpr::parse(expr).map(|_| ()),
        }
    }

    /// Resolve to an ordered, deduplicated list of reachable contacts
    pub async fn resolve(
        &self,
        ctx: &TenantContext,
        descriptor: &AudienceDescriptor,
    ) -> Result<Vec<ContactId>> {
        let candidates: Vec<Contact> = match descriptor {
            AudienceDescriptor::AllContacts => self.contacts.list_live(ctx).await?,
            AudienceDescriptor::ContactGroup(group) => {
                Self::validate(descriptor)?;
                self.contacts.list_live_with_tag(ctx, group).await?
            }
            AudienceDescriptor::CustomFilter(expr) => {
                let filter = FilterExpr::parse(expr)?;
                self.contacts
                    .list_live(ctx)
                    .await?
                    .into_iter()
                    .filter(|c| filter.matches(c))
                    .collect()
            }
        };

        let mut seen = HashSet::with_capacity(candidates.len());
        let resolved: Vec<ContactId> = candidates
            .into_iter()
            .filter(|c| c.is_reachable())
            .filter(|c| seen.insert(c.id))
            .map(|c| c.id)
            .collect();

        debug!(
            vendor_id = %ctx.vendor_id,
            count = resolved.len(),
            "Resolved campaign audience"
        );

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;
    use whatsjet_storage::models::CreateContact;
    use whatsjet_storage::MemoryStore;

    async fn seed(store: &MemoryStore, ctx: &TenantContext, phone: &str, tags: &[&str]) -> Contact {
        ContactRepository::create(
            store,
            ctx,
            CreateContact {
                phone_number: phone.to_string(),
                first_name: format!("Contact {}", phone),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_all_contacts_excludes_opted_out_and_deleted() {
        let store = Arc::new(MemoryStore::new());
        let ctx = TenantContext::new(Uuid::new_v4());
        let a = seed(&store, &ctx, "+1001", &[]).await;
        let b = seed(&store, &ctx, "+1002", &[]).await;
        let c = seed(&store, &ctx, "+1003", &[]).await;
        let d = seed(&store, &ctx, "+1004", &[]).await;
        store.set_opted_out(&ctx, b.id, true).await.unwrap();
        store.soft_delete(&ctx, c.id).await.unwrap();

        let resolver = AudienceResolver::new(store.clone());
        let ids = resolver
            .resolve(&ctx, &AudienceDescriptor::AllContacts)
            .await
            .unwrap();
        assert_eq!(ids, vec![a.id, d.id]);
    }

    #[tokio::test]
    async fn test_group_and_filter_resolution() {
        let store = Arc::new(MemoryStore::new());
        let ctx = TenantContext::new(Uuid::new_v4());
        let vip = seed(&store, &ctx, "+2001", &["vip"]).await;
        let _plain = seed(&store, &ctx, "+2002", &[]).await;
        let both = seed(&store, &ctx, "+4403", &["vip", "uk"]).await;

        let resolver = AudienceResolver::new(store.clone());
        let group = resolver
            .resolve(&ctx, &AudienceDescriptor::ContactGroup("vip".into()))
            .await
            .unwrap();
        assert_eq!(group, vec![vip.id, both.id]);

        let filtered = resolver
            .resolve(
                &ctx,
                &AudienceDescriptor::CustomFilter("phone_number ^ \"+44\" AND tag = vip".into()),
            )
            .await
            .unwrap();
        assert_eq!(filtered, vec![both.id]);
    }

    #[tokio::test]
    async fn test_malformed_filter_is_resolution_error() {
        let store = Arc::new(MemoryStore::new());
        let resolver = AudienceResolver::new(store);
        let err = resolver
            .resolve(
                &TenantContext::new(Uuid::new_v4()),
                &AudienceDescriptor::CustomFilter("tag ==".into()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AUDIENCE_RESOLUTION_ERROR");
    }

    #[tokio::test]
    async fn test_other_vendors_contacts_are_invisible() {
        let store = Arc::new(MemoryStore::new());
        let mine = TenantContext::new(Uuid::new_v4());
        let theirs = TenantContext::new(Uuid::new_v4());
        seed(&store, &theirs, "+3001", &[]).await;

        let resolver = AudienceResolver::new(store.clone());
        let ids = resolver
            .resolve(&mine, &AudienceDescriptor::AllContacts)
            .await
            .unwrap();
        assert!(ids.is_empty());
    }
}
