use std::collections::{BTreeSet, HashMap};

use futures::{FutureExt, future::BoxFuture};

use crate::{
    config::{AppConfig, MemberEntry, ScopeDirectory},
    gateway::{Authorizer, MembershipSource},
    state::{ScopeId, players::PlayerId},
};

/// Membership source answering from the directory declared in the configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    scopes: HashMap<ScopeId, ScopeDirectory>,
}

impl StaticDirectory {
    /// Snapshot the per-scope directories of `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            scopes: config.scopes().clone(),
        }
    }

    /// Resolve role holders synchronously.
    pub fn role_holders(&self, scope: &ScopeId, role: &str) -> Option<BTreeSet<PlayerId>> {
        let directory = self.scopes.get(scope)?;
        let has_role = |member: &MemberEntry| {
            member
                .roles
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(role))
        };

        let declared = directory
            .roles
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(role));
        if !declared && !directory.members.iter().any(has_role) {
            return None;
        }

        Some(
            directory
                .members
                .iter()
                .filter(|member| !member.bot && has_role(member))
                .map(|member| member.id)
                .collect(),
        )
    }
}

impl MembershipSource for StaticDirectory {
    fn list_role_holders(
        &self,
        scope: &ScopeId,
        role: &str,
    ) -> BoxFuture<'static, Option<BTreeSet<PlayerId>>> {
        futures::future::ready(self.role_holders(scope, role)).boxed()
    }
}

/// Authorizer granting moderator rights to the ids listed in the configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigAuthorizer {
    global: BTreeSet<PlayerId>,
    per_scope: HashMap<ScopeId, BTreeSet<PlayerId>>,
}

impl ConfigAuthorizer {
    /// Collect global and per-scope moderators from `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            global: config.moderators().clone(),
            per_scope: config
                .scopes()
                .iter()
                .map(|(scope, directory)| (scope.clone(), directory.moderators.clone()))
                .collect(),
        }
    }

    fn allows(&self, caller: PlayerId, scope: &ScopeId) -> bool {
        self.global.contains(&caller)
            || self
                .per_scope
                .get(scope)
                .is_some_and(|moderators| moderators.contains(&caller))
    }
}

impl Authorizer for ConfigAuthorizer {
    fn is_moderator(&self, caller: PlayerId, scope: &ScopeId) -> BoxFuture<'static, bool> {
        futures::future::ready(self.allows(caller, scope)).boxed()
    }
}
