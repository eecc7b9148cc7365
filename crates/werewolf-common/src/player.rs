use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::Role;

pub const MAX_NAME_LEN: usize = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub alive: bool,
}

impl Player {
    pub fn new(id: Uuid, name: String) -> Self {
        Self {
            id,
            name,
            role: Role::Villager,
            alive: true,
        }
    }
}

/// Display names are the wire-level identity: non-blank, at most 15 chars,
/// no surrounding whitespace.
pub fn valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed.len() <= MAX_NAME_LEN && trimmed == name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(valid_name("Alice"));
        assert!(valid_name("a"));
        assert!(valid_name("fifteen-chars-x"));
    }

    #[test]
    fn test_invalid_names() {
        assert!(!valid_name(""));
        assert!(!valid_name("   "));
        assert!(!valid_name(" padded"));
        assert!(!valid_name("sixteen-chars-xy"));
    }

    #[test]
    fn test_new_player_starts_as_living_villager() {
        let p = Player::new(Uuid::new_v4(), "Alice".into());
        assert!(p.alive);
        assert_eq!(p.role, Role::Villager);
    }
}
