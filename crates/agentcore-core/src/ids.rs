//! Entity identifiers and the autonomy-level scale shared across the core.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

uuid_id!(AgentId);
uuid_id!(UserId);
uuid_id!(CheckpointId);
uuid_id!(PlanId);
uuid_id!(MemoryId);
uuid_id!(HealingId);
uuid_id!(SelfPromptId);
uuid_id!(ApprovalId);

/// Autonomy level gates which tool categories an agent can invoke without
/// approval. Numeric mapping per spec: supervised=1, semi-autonomous=3,
/// autonomous=5. The odd gaps (2, 4) exist in the source scale ("low",
/// "high") but this core only models the three named levels agent profiles
/// can hold.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    Supervised,
    SemiAutonomous,
    Autonomous,
}

impl AutonomyLevel {
    pub fn numeric(self) -> u8 {
        match self {
            AutonomyLevel::Supervised => 1,
            AutonomyLevel::SemiAutonomous => 3,
            AutonomyLevel::Autonomous => 5,
        }
    }

    /// Clamp `self` to at most `cap` (used when capping a child's requested
    /// autonomy at the parent's `children_autonomy_cap`).
    pub fn capped_at(self, cap: AutonomyLevel) -> AutonomyLevel {
        if self.numeric() <= cap.numeric() {
            self
        } else {
            cap
        }
    }
}

impl std::fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AutonomyLevel::Supervised => "supervised",
            AutonomyLevel::SemiAutonomous => "semi-autonomous",
            AutonomyLevel::Autonomous => "autonomous",
        };
        write!(f, "{s}")
    }
}
