use std::collections::HashMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::GameError;

/// Three special roles plus two villagers is the smallest playable game.
pub const MIN_PLAYERS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Villager,
    Werewolf,
    Doctor,
    Seer,
}

impl Role {
    pub fn is_werewolf(self) -> bool {
        self == Role::Werewolf
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Role::Villager => "VILLAGER",
            Role::Werewolf => "WEREWOLF",
            Role::Doctor => "DOCTOR",
            Role::Seer => "SEER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Special roles dealt for a roster of the given size. Everyone who doesn't
/// draw from this pool is a villager.
///
/// One werewolf, one doctor, one seer as the base. Rosters above 5 get a
/// second werewolf; from 15 players up, one more werewolf per 4 players
/// beyond 11.
pub fn role_pool(roster_size: usize) -> Vec<Role> {
    let mut pool = vec![Role::Werewolf, Role::Doctor, Role::Seer];
    if roster_size > 5 {
        pool.push(Role::Werewolf);
    }
    if roster_size >= 15 {
        for _ in 0..(roster_size - 11) / 4 {
            pool.push(Role::Werewolf);
        }
    }
    pool
}

/// Deal roles to the given players. Both the pool and the player list are
/// shuffled uniformly, so neither join order nor pool order leaks into the
/// assignment.
pub fn assign_roles(
    player_ids: &[Uuid],
    rng: &mut impl Rng,
) -> Result<HashMap<Uuid, Role>, GameError> {
    let mut pool = role_pool(player_ids.len());
    if player_ids.len() < MIN_PLAYERS {
        return Err(GameError::InsufficientPlayers {
            have: player_ids.len(),
            need: MIN_PLAYERS,
        });
    }

    let mut ids: Vec<Uuid> = player_ids.to_vec();
    pool.shuffle(rng);
    ids.shuffle(rng);

    let mut assignment: HashMap<Uuid, Role> = HashMap::with_capacity(ids.len());
    for id in ids {
        let role = pool.pop().unwrap_or(Role::Villager);
        assignment.insert(id, role);
    }
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    fn count(assignment: &HashMap<Uuid, Role>, role: Role) -> usize {
        assignment.values().filter(|r| **r == role).count()
    }

    #[test]
    fn test_pool_scaling() {
        assert_eq!(role_pool(5).len(), 3);
        assert_eq!(role_pool(6).len(), 4);
        assert_eq!(role_pool(14).len(), 4);
        // 15 players: base 3 + 1 (over 5) + (15-11)/4 = 5
        assert_eq!(role_pool(15).len(), 5);
        assert_eq!(role_pool(19).len(), 6);
    }

    #[test]
    fn test_pool_has_one_doctor_and_one_seer() {
        for n in [5, 6, 15, 23] {
            let pool = role_pool(n);
            assert_eq!(pool.iter().filter(|r| **r == Role::Doctor).count(), 1);
            assert_eq!(pool.iter().filter(|r| **r == Role::Seer).count(), 1);
        }
    }

    #[test]
    fn test_assign_below_minimum_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        for n in 0..MIN_PLAYERS {
            let ids = make_ids(n);
            assert!(matches!(
                assign_roles(&ids, &mut rng),
                Err(GameError::InsufficientPlayers { .. })
            ));
        }
    }

    #[test]
    fn test_assign_exactly_one_role_per_player() {
        let mut rng = StdRng::seed_from_u64(2);
        let ids = make_ids(7);
        let assignment = assign_roles(&ids, &mut rng).unwrap();
        assert_eq!(assignment.len(), 7);
        for id in &ids {
            assert!(assignment.contains_key(id));
        }
    }

    #[test]
    fn test_assign_role_counts_follow_scaling() {
        let mut rng = StdRng::seed_from_u64(3);

        let five = assign_roles(&make_ids(5), &mut rng).unwrap();
        assert_eq!(count(&five, Role::Werewolf), 1);
        assert_eq!(count(&five, Role::Doctor), 1);
        assert_eq!(count(&five, Role::Seer), 1);
        assert_eq!(count(&five, Role::Villager), 2);

        let six = assign_roles(&make_ids(6), &mut rng).unwrap();
        assert_eq!(count(&six, Role::Werewolf), 2);
        assert_eq!(count(&six, Role::Villager), 2);

        let fifteen = assign_roles(&make_ids(15), &mut rng).unwrap();
        assert_eq!(count(&fifteen, Role::Werewolf), 3);
        assert_eq!(count(&fifteen, Role::Villager), 10);
    }

    #[test]
    fn test_reassignment_not_pinned_to_join_order() {
        // Two deals over the same roster are allowed to differ; only the
        // counts are pinned. With 20 players the odds of an identical deal
        // from different seeds are negligible.
        let ids = make_ids(20);
        let a = assign_roles(&ids, &mut StdRng::seed_from_u64(10)).unwrap();
        let b = assign_roles(&ids, &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(count(&a, Role::Werewolf), count(&b, Role::Werewolf));
        assert_ne!(a, b);
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(Role::Werewolf.to_string(), "WEREWOLF");
        assert_eq!(Role::Villager.to_string(), "VILLAGER");
        let json = serde_json::to_string(&Role::Seer).unwrap();
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::Seer);
    }
}
