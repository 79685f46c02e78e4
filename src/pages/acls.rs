use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    acl::AclRules,
    data_service::{DataService, Query, Table, fetch_all, insert_row, update_row},
    error::{AppError, Result},
    models::{Acl, AclForm},
};

#[derive(Serialize)]
struct AclRow<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<Uuid>,
    name: &'a str,
    rules: &'a AclRules,
}

/// AclsPage
///
/// Named ACLs. Every stored row is listed; rules the console cannot read are shown
/// as raw JSON so they can be fixed through the edit form.
#[derive(Debug, Clone, Default)]
pub struct AclsPage {
    acls: Vec<Acl>,
}

impl AclsPage {
    pub async fn load(data: &dyn DataService) -> Result<Self> {
        let acls: Vec<Acl> = fetch_all(data, Table::Acls, Query::new().newest_first()).await?;
        for acl in acls.iter().filter(|acl| !acl.rules.is_recognized()) {
            warn!(id = acl.id, "ACL row holds rules in an unrecognized shape");
        }
        Ok(Self { acls })
    }

    pub fn acls(&self) -> &[Acl] {
        &self.acls
    }

    /// The edit form for an ACL, with its rules pretty-printed.
    pub fn edit_form(&self, id: i64) -> Result<AclForm> {
        let acl = self
            .acls
            .iter()
            .find(|acl| acl.id == id)
            .ok_or_else(|| AppError::NotFound(format!("ACL {id}")))?;

        Ok(AclForm {
            name: acl.name.clone(),
            rules: acl.rules.to_pretty_json()?,
        })
    }

    /// save
    ///
    /// Creates an ACL owned by `owner`, or updates ACL `editing` when given. The form
    /// is parsed and validated first; nothing is written when it is rejected.
    pub async fn save(
        &mut self,
        data: &dyn DataService,
        owner: Uuid,
        editing: Option<i64>,
        form: &AclForm,
    ) -> Result<()> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("ACL name is required".to_string()));
        }
        let rules = AclRules::parse(&form.rules)?;

        let stored: Acl = match editing {
            Some(id) => {
                let patch = AclRow {
                    user_id: None,
                    name,
                    rules: &rules,
                };
                update_row(data, Table::Acls, id.into(), &patch).await?
            }
            None => {
                let row = AclRow {
                    user_id: Some(owner),
                    name,
                    rules: &rules,
                };
                insert_row(data, Table::Acls, &row).await?
            }
        };

        match Self::load(data).await {
            Ok(page) => *self = page,
            Err(e) => {
                warn!(
                    id = stored.id,
                    error = %e,
                    "ACL saved but the list could not be reloaded"
                );
                self.merge(stored);
            }
        }
        Ok(())
    }

    fn merge(&mut self, acl: Acl) {
        match self.acls.iter_mut().find(|existing| existing.id == acl.id) {
            Some(existing) => *existing = acl,
            None => self.acls.insert(0, acl),
        }
    }

    pub async fn delete(&mut self, data: &dyn DataService, id: i64) -> Result<()> {
        data.delete(Table::Acls, id.into()).await?;
        self.acls.retain(|acl| acl.id != id);
        Ok(())
    }
}
