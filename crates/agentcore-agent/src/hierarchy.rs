//! Hierarchy Service (§4.12) — CRUD over agent profiles plus the
//! inheritance, autonomy-cap, and depth/breadth rules from §3.
//!
//! Storage is modeled as an `AgentStore` trait with one `InMemoryAgentStore`
//! implementation guarded by `dashmap`, mirroring how the teacher treats
//! persistence as swappable behind a narrow trait rather than a concrete
//! database client baked into the service.

use crate::profile::{AgentProfile, AgentStatus, AgentType, CreatedByType};
use agentcore_core::{AgentId, AutonomyLevel, Error, Result, UserId};
use dashmap::DashMap;
use std::sync::Arc;

/// CRUD + list-by-user + list-children over agent profiles (§9 "model as
/// explicitly-constructed components", not a global singleton).
pub trait AgentStore: Send + Sync {
    fn get(&self, id: AgentId) -> Option<AgentProfile>;
    fn upsert(&self, profile: AgentProfile);
    fn list_by_user(&self, user_id: UserId) -> Vec<AgentProfile>;
    fn list_children(&self, parent_id: AgentId) -> Vec<AgentProfile>;
    fn soft_delete(&self, id: AgentId);
    /// Every live profile regardless of owner — the Trigger Engine and
    /// Heartbeat Monitor scan the whole population, not one user's agents.
    fn list_all(&self) -> Vec<AgentProfile>;
}

#[derive(Default)]
pub struct InMemoryAgentStore {
    profiles: DashMap<AgentId, AgentProfile>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentStore for InMemoryAgentStore {
    fn get(&self, id: AgentId) -> Option<AgentProfile> {
        self.profiles.get(&id).map(|p| p.clone())
    }

    fn upsert(&self, profile: AgentProfile) {
        self.profiles.insert(profile.id, profile);
    }

    fn list_by_user(&self, user_id: UserId) -> Vec<AgentProfile> {
        self.profiles
            .iter()
            .filter(|e| e.user_id == user_id && e.status != AgentStatus::Deleted)
            .map(|e| e.clone())
            .collect()
    }

    fn list_children(&self, parent_id: AgentId) -> Vec<AgentProfile> {
        self.profiles
            .iter()
            .filter(|e| e.parent_id == Some(parent_id) && e.status != AgentStatus::Deleted)
            .map(|e| e.clone())
            .collect()
    }

    fn soft_delete(&self, id: AgentId) {
        if let Some(mut entry) = self.profiles.get_mut(&id) {
            entry.status = AgentStatus::Deleted;
        }
    }

    fn list_all(&self) -> Vec<AgentProfile> {
        self.profiles
            .iter()
            .filter(|e| e.status != AgentStatus::Deleted)
            .map(|e| e.clone())
            .collect()
    }
}

/// Data needed to create a sub-agent; everything else is derived or
/// inherited from the parent (§3, §4.12).
pub struct NewSubAgent {
    pub name: String,
    pub role: String,
    pub requested_autonomy: AutonomyLevel,
    pub system_prompt: String,
    pub provider: String,
    pub model: String,
    pub can_create_children: bool,
}

pub struct HierarchyService {
    store: Arc<dyn AgentStore>,
}

impl HierarchyService {
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self { store }
    }

    pub fn get_profile(&self, id: AgentId, user_id: UserId) -> Result<AgentProfile> {
        let profile = self
            .store
            .get(id)
            .ok_or_else(|| Error::not_found(format!("agent {id} not found")))?;
        if profile.user_id != user_id {
            return Err(Error::access_denied("agent belongs to a different user"));
        }
        Ok(profile)
    }

    pub fn list_profiles(&self, user_id: UserId) -> Vec<AgentProfile> {
        self.store.list_by_user(user_id)
    }

    /// Every live profile across every owner, for system-wide scanners.
    pub fn list_all_profiles(&self) -> Vec<AgentProfile> {
        self.store.list_all()
    }

    pub fn create_profile(&self, profile: AgentProfile) -> Result<AgentProfile> {
        if !profile.is_hierarchy_consistent() {
            return Err(Error::invalid_input("profile violates hierarchy invariants"));
        }
        self.store.upsert(profile.clone());
        Ok(profile)
    }

    pub fn update_profile(
        &self,
        id: AgentId,
        user_id: UserId,
        mutate: impl FnOnce(&mut AgentProfile),
    ) -> Result<AgentProfile> {
        let mut profile = self.get_profile(id, user_id)?;
        mutate(&mut profile);
        if !profile.is_hierarchy_consistent() {
            return Err(Error::invalid_input("update violates hierarchy invariants"));
        }
        self.store.upsert(profile.clone());
        Ok(profile)
    }

    /// Background fields and contact-scope fields are writable only on
    /// masters (§3); sub-agents must go through their root master.
    pub fn update_master_only_field(
        &self,
        id: AgentId,
        user_id: UserId,
        mutate: impl FnOnce(&mut AgentProfile),
    ) -> Result<AgentProfile> {
        let profile = self.get_profile(id, user_id)?;
        if !profile.is_master() {
            return Err(Error::policy_violation(
                "this field is writable only on the master agent",
            ));
        }
        self.update_profile(id, user_id, mutate)
    }

    pub fn delete_profile(&self, id: AgentId, user_id: UserId) -> Result<()> {
        let _ = self.get_profile(id, user_id)?;
        self.store.soft_delete(id);
        Ok(())
    }

    /// `createSubAgent(parent_id, data)` (§4.12, testable property #2, #3).
    pub fn create_sub_agent(
        &self,
        parent_id: AgentId,
        user_id: UserId,
        data: NewSubAgent,
    ) -> Result<AgentProfile> {
        let parent = self.get_profile(parent_id, user_id)?;

        if !parent.child_policy.can_create_children {
            return Err(Error::policy_violation("parent cannot create children"));
        }
        if parent.hierarchy_level + 1 > parent.child_policy.max_hierarchy_depth {
            return Err(Error::policy_violation("max hierarchy depth exceeded"));
        }
        let live_children = self
            .store
            .list_children(parent_id)
            .iter()
            .filter(|c| c.status != AgentStatus::Deleted)
            .count();
        if live_children >= parent.child_policy.max_children {
            return Err(Error::policy_violation("parent's max_children reached"));
        }

        let id = AgentId::new();
        let mut hierarchy_path = parent.hierarchy_path.clone();
        hierarchy_path.push(id);

        let autonomy_level = data
            .requested_autonomy
            .capped_at(parent.child_policy.children_autonomy_cap);

        let profile = AgentProfile {
            id,
            user_id,
            name: data.name,
            role: data.role,
            agent_type: AgentType::Sub,
            parent_id: Some(parent_id),
            hierarchy_level: parent.hierarchy_level + 1,
            hierarchy_path,
            created_by_type: CreatedByType::Agentic,
            created_by_agentic_id: Some(parent_id),
            inheritance: parent.inheritance.clone(),
            routing: crate::profile::ModelRoutingConfig {
                provider: data.provider,
                model: data.model,
                temperature: parent.routing.temperature,
                max_tokens: parent.routing.max_tokens,
                routing_preset: parent.routing.routing_preset.clone(),
                system_prompt: data.system_prompt,
            },
            autonomy_level,
            require_approval_for: parent.require_approval_for.clone(),
            child_policy: crate::profile::ChildCreationPolicy {
                can_create_children: data.can_create_children,
                max_children: parent.child_policy.max_children,
                max_hierarchy_depth: parent.child_policy.max_hierarchy_depth,
                children_autonomy_cap: parent.child_policy.children_autonomy_cap,
            },
            budgets: parent.budgets.clone(),
            status: AgentStatus::Active,
            heartbeat: parent.heartbeat.clone(),
            max_prompts_per_hour: parent.max_prompts_per_hour,
            auto_approve_threshold: parent.auto_approve_threshold,
        };

        self.store.upsert(profile.clone());
        Ok(profile)
    }

    /// `detachFromParent(id)` (§4.12): promotes to master and recursively
    /// rewrites descendants' paths. DFS; failure mid-way leaves partial
    /// rewrites, which is safe because the operation is replayable.
    pub fn detach_from_parent(&self, id: AgentId, user_id: UserId) -> Result<AgentProfile> {
        let mut profile = self.get_profile(id, user_id)?;
        let old_path = profile.hierarchy_path.clone();

        profile.agent_type = AgentType::Master;
        profile.parent_id = None;
        profile.hierarchy_level = 0;
        profile.hierarchy_path = vec![id];
        self.store.upsert(profile.clone());

        self.rewrite_descendant_paths(id, &old_path, user_id);
        Ok(profile)
    }

    fn rewrite_descendant_paths(&self, new_root: AgentId, old_path: &[AgentId], user_id: UserId) {
        for mut child in self.store.list_children(new_root) {
            // Old suffix after the detached node's old position becomes the
            // new relative path under `new_root`.
            let old_index = old_path.iter().position(|id| *id == new_root);
            let suffix: Vec<AgentId> = match old_index {
                Some(idx) => child
                    .hierarchy_path
                    .iter()
                    .skip(idx + 1)
                    .copied()
                    .collect(),
                None => vec![child.id],
            };
            let mut new_path = vec![new_root];
            new_path.extend(suffix);
            child.hierarchy_path = new_path;
            child.hierarchy_level = (child.hierarchy_path.len() as u32).saturating_sub(1);
            self.store.upsert(child.clone());
            if user_id == child.user_id {
                self.rewrite_descendant_paths(child.id, old_path, user_id);
            }
        }
    }

    /// `getHierarchy(id)`: walk the path prefix to the root master, load all
    /// live descendants of that root, compose the tree by parent_id.
    pub fn get_hierarchy(&self, id: AgentId, user_id: UserId) -> Result<Vec<AgentProfile>> {
        let profile = self.get_profile(id, user_id)?;
        let root_id = profile.root_master_id();
        let root = self.get_profile(root_id, user_id)?;
        let mut all = vec![root];
        self.collect_descendants(root_id, &mut all);
        Ok(all)
    }

    fn collect_descendants(&self, parent_id: AgentId, acc: &mut Vec<AgentProfile>) {
        for child in self.store.list_children(parent_id) {
            acc.push(child.clone());
            self.collect_descendants(child.id, acc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Budgets, ChildCreationPolicy, HeartbeatConfig, InheritanceFlags, ModelRoutingConfig};
    use std::collections::HashSet;

    fn master(user_id: UserId) -> AgentProfile {
        let id = AgentId::new();
        AgentProfile {
            id,
            user_id,
            name: "Master".into(),
            role: "coordinator".into(),
            agent_type: AgentType::Master,
            parent_id: None,
            hierarchy_level: 0,
            hierarchy_path: vec![id],
            created_by_type: CreatedByType::User,
            created_by_agentic_id: None,
            inheritance: InheritanceFlags::default(),
            routing: ModelRoutingConfig {
                provider: "anthropic".into(),
                model: "claude".into(),
                temperature: 0.7,
                max_tokens: 4096,
                routing_preset: None,
                system_prompt: String::new(),
            },
            autonomy_level: AutonomyLevel::Autonomous,
            require_approval_for: HashSet::new(),
            child_policy: ChildCreationPolicy {
                can_create_children: true,
                max_children: 2,
                max_hierarchy_depth: 2,
                children_autonomy_cap: AutonomyLevel::SemiAutonomous,
            },
            budgets: Budgets::default(),
            status: AgentStatus::Active,
            heartbeat: HeartbeatConfig::default(),
            max_prompts_per_hour: 10,
            auto_approve_threshold: 0.9,
        }
    }

    fn sub_request() -> NewSubAgent {
        NewSubAgent {
            name: "Specialist".into(),
            role: "web research".into(),
            requested_autonomy: AutonomyLevel::Autonomous,
            system_prompt: String::new(),
            provider: "anthropic".into(),
            model: "claude".into(),
            can_create_children: false,
        }
    }

    #[test]
    fn create_sub_agent_caps_autonomy_at_parent_policy() {
        let user_id = UserId::new();
        let store = Arc::new(InMemoryAgentStore::new());
        let service = HierarchyService::new(store.clone());
        let m = master(user_id);
        store.upsert(m.clone());

        let sub = service.create_sub_agent(m.id, user_id, sub_request()).unwrap();
        assert_eq!(sub.autonomy_level, AutonomyLevel::SemiAutonomous);
        assert_eq!(sub.hierarchy_level, 1);
        assert_eq!(sub.hierarchy_path, vec![m.id, sub.id]);
    }

    #[test]
    fn create_sub_agent_fails_beyond_max_children() {
        let user_id = UserId::new();
        let store = Arc::new(InMemoryAgentStore::new());
        let service = HierarchyService::new(store.clone());
        let m = master(user_id);
        store.upsert(m.clone());

        service.create_sub_agent(m.id, user_id, sub_request()).unwrap();
        service.create_sub_agent(m.id, user_id, sub_request()).unwrap();
        let err = service.create_sub_agent(m.id, user_id, sub_request()).unwrap_err();
        assert!(matches!(err, Error::PolicyViolation(_)));
    }

    #[test]
    fn create_sub_agent_fails_beyond_max_depth() {
        let user_id = UserId::new();
        let store = Arc::new(InMemoryAgentStore::new());
        let service = HierarchyService::new(store.clone());
        let mut m = master(user_id);
        m.child_policy.max_hierarchy_depth = 0;
        store.upsert(m.clone());

        let err = service.create_sub_agent(m.id, user_id, sub_request()).unwrap_err();
        assert!(matches!(err, Error::PolicyViolation(_)));
    }

    #[test]
    fn detach_promotes_to_master_and_rewrites_descendant_paths() {
        let user_id = UserId::new();
        let store = Arc::new(InMemoryAgentStore::new());
        let service = HierarchyService::new(store.clone());
        let m = master(user_id);
        store.upsert(m.clone());
        let sub = service.create_sub_agent(m.id, user_id, sub_request()).unwrap();

        // Give the sub its own (would-be) child path by inserting a grandchild directly.
        let grandchild_id = AgentId::new();
        let mut grandchild = sub.clone();
        grandchild.id = grandchild_id;
        grandchild.parent_id = Some(sub.id);
        grandchild.hierarchy_level = 2;
        grandchild.hierarchy_path = vec![m.id, sub.id, grandchild_id];
        grandchild.agent_type = AgentType::Sub;
        store.upsert(grandchild);

        let detached = service.detach_from_parent(sub.id, user_id).unwrap();
        assert!(detached.is_master());
        assert_eq!(detached.hierarchy_path, vec![sub.id]);

        let updated_grandchild = store.get(grandchild_id).unwrap();
        assert_eq!(updated_grandchild.hierarchy_path, vec![sub.id, grandchild_id]);
        assert_eq!(updated_grandchild.hierarchy_level, 1);
    }

    #[test]
    fn get_hierarchy_returns_root_and_all_live_descendants() {
        let user_id = UserId::new();
        let store = Arc::new(InMemoryAgentStore::new());
        let service = HierarchyService::new(store.clone());
        let m = master(user_id);
        store.upsert(m.clone());
        let sub = service.create_sub_agent(m.id, user_id, sub_request()).unwrap();

        let tree = service.get_hierarchy(sub.id, user_id).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.iter().any(|p| p.id == m.id));
        assert!(tree.iter().any(|p| p.id == sub.id));
    }

    #[test]
    fn cross_user_access_is_denied() {
        let user_a = UserId::new();
        let user_b = UserId::new();
        let store = Arc::new(InMemoryAgentStore::new());
        let service = HierarchyService::new(store.clone());
        let m = master(user_a);
        store.upsert(m.clone());

        let err = service.get_profile(m.id, user_b).unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));
    }
}
