//! Group membership and role derivation
//!
//! Each configured group is looked up on its own. A failed lookup is logged
//! and counts as "not a member" of that group only; it does not fail the
//! login. [`GroupMembershipResolver::resolve_groups_strict`] fails instead.

use crate::ldap::directory::{DirectorySession, SearchScope};
use crate::ldap::types::{GroupMembership, ResolvedEntry, Role};
use dirauth_core::{DirectoryConfig, Result};
use tracing::{debug, warn};

pub struct GroupMembershipResolver;

impl GroupMembershipResolver {
    /// Groups and roles for `entry`, degrading per group on lookup errors.
    pub async fn resolve_groups(
        session: &mut dyn DirectorySession,
        config: &DirectoryConfig,
        entry: &ResolvedEntry,
    ) -> GroupMembership {
        let mut member_of = Vec::new();
        for group in config.group_names() {
            match Self::is_member(session, config, group, &entry.dn).await {
                Ok(true) => member_of.push(group),
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        group,
                        dn = %entry.dn,
                        "Group lookup failed, treating as not a member: {}",
                        e
                    );
                }
            }
        }
        Self::membership(config, &member_of)
    }

    /// Like [`Self::resolve_groups`], but any lookup error fails the call.
    pub async fn resolve_groups_strict(
        session: &mut dyn DirectorySession,
        config: &DirectoryConfig,
        entry: &ResolvedEntry,
    ) -> Result<GroupMembership> {
        let mut member_of = Vec::new();
        for group in config.group_names() {
            if Self::is_member(session, config, group, &entry.dn).await? {
                member_of.push(group);
            }
        }
        Ok(Self::membership(config, &member_of))
    }

    /// Whether `dn` is listed in the member attribute of `group`.
    async fn is_member(
        session: &mut dyn DirectorySession,
        config: &DirectoryConfig,
        group: &str,
        dn: &str,
    ) -> Result<bool> {
        let filter = config.build_group_filter(&ldap3::ldap_escape(group));
        let attribute = config.member_attribute();
        let expected = config.member_value(dn);

        debug!("Searching group {} with filter: {}", group, filter);

        let entries = session
            .search(&config.search_base, SearchScope::Subtree, &filter, &[attribute])
            .await?;

        Ok(entries.iter().any(|group_entry| {
            group_entry
                .values(attribute)
                .iter()
                .any(|member| member.eq_ignore_ascii_case(&expected))
        }))
    }

    /// Turn found groups into roles; the default flags override membership.
    fn membership(config: &DirectoryConfig, member_of: &[&str]) -> GroupMembership {
        let mut membership = GroupMembership::default();

        for group in member_of {
            membership.groups.insert(group.to_string());
            if config.admin_group_name.as_deref() == Some(*group) {
                membership.roles.insert(Role::Admin);
            }
            if config.user_group_name.as_deref() == Some(*group) {
                membership.roles.insert(Role::User);
            }
        }

        if config.default_admin_group {
            membership.roles.insert(Role::Admin);
        }
        if config.default_user_group {
            membership.roles.insert(Role::User);
        }

        debug!(
            "Found {} groups, roles {:?}",
            membership.groups.len(),
            membership.roles
        );
        membership
    }
}
