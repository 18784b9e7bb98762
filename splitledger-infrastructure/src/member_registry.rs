use dashmap::DashMap;
use indexmap::IndexMap;
use splitledger_application::{Member, MemberRegistry, StoreError};
use splitledger_domain::{GroupId, MemberId};

/// Display names per group, listed in registration order.
#[derive(Debug, Default)]
pub struct InMemoryMemberRegistry {
    groups: DashMap<GroupId, IndexMap<MemberId, String>>,
}

impl InMemoryMemberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a member, replacing any earlier display name.
    pub fn register(&self, group_id: GroupId, member: MemberId, display_name: impl Into<String>) {
        self.groups
            .entry(group_id)
            .or_default()
            .insert(member, display_name.into());
    }

    pub fn display_name(&self, group_id: GroupId, member: MemberId) -> Option<String> {
        self.groups
            .get(&group_id)
            .and_then(|members| members.get(&member).cloned())
    }
}

impl MemberRegistry for InMemoryMemberRegistry {
    fn list_members(&self, group_id: GroupId) -> Result<Vec<Member>, StoreError> {
        Ok(self
            .groups
            .get(&group_id)
            .map(|members| {
                members
                    .iter()
                    .map(|(id, name)| Member {
                        id: *id,
                        display_name: name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
