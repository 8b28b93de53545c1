//! Instruction chain traversal
//!
//! Walking an instruction visits its full before-chain, then the
//! instruction itself, then its full after-chain. Visits are awaited one at a
//! time. Each instruction is visited at most once per walk, and a cycle in
//! the links stops the walk before anything is visited.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{trace, warn};

use crate::error::WalkError;
use crate::instruction::{Instruction, InstructionArena, InstructionIndex};

/// Callback invoked for every instruction of a walk
#[async_trait]
pub trait Visitor: Send {
    async fn visit(&mut self, instruction: &Instruction, is_root: bool);
}

/// Traverses before/after chains of an arena
pub struct Walker<'a> {
    arena: &'a InstructionArena,
}

impl<'a> Walker<'a> {
    pub fn new(arena: &'a InstructionArena) -> Self {
        Self { arena }
    }

    /// Visiting order for a walk rooted at `root`
    pub fn order(&self, root: InstructionIndex) -> Result<Vec<InstructionIndex>, WalkError> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.collect(Some(root), &mut order, &mut visited, &mut path)?;
        Ok(order)
    }

    fn collect(
        &self,
        node: Option<InstructionIndex>,
        order: &mut Vec<InstructionIndex>,
        visited: &mut HashSet<InstructionIndex>,
        path: &mut Vec<InstructionIndex>,
    ) -> Result<(), WalkError> {
        let Some(index) = node else {
            return Ok(());
        };
        let Some(instruction) = self.arena.get(index) else {
            return Ok(());
        };

        if path.contains(&index) {
            let mut ids: Vec<String> = path.iter().map(|i| self.arena[*i].id.clone()).collect();
            ids.push(instruction.id.clone());
            return Err(WalkError::Cycle {
                instruction_id: instruction.id.clone(),
                path: ids,
            });
        }
        if visited.contains(&index) {
            return Ok(());
        }

        path.push(index);
        self.collect(instruction.before, order, visited, path)?;
        if visited.insert(index) {
            order.push(index);
        }
        self.collect(instruction.after, order, visited, path)?;
        path.pop();

        Ok(())
    }

    /// Walk the chain rooted at `root`, awaiting each visit in turn
    pub async fn walk<V>(&self, root: InstructionIndex, visitor: &mut V) -> Result<(), WalkError>
    where
        V: Visitor + ?Sized,
    {
        let order = self.order(root).map_err(|e| {
            warn!(error = %e, "Refusing to walk cyclic instruction chain");
            e
        })?;

        for index in order {
            let instruction = &self.arena[index];
            trace!(instruction_id = %instruction.id, is_root = index == root, "Visiting instruction");
            visitor.visit(instruction, index == root).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstructionConfig;

    #[derive(Default)]
    struct Recorder {
        visits: Vec<(String, bool)>,
    }

    #[async_trait]
    impl Visitor for Recorder {
        async fn visit(&mut self, instruction: &Instruction, is_root: bool) {
            tokio::task::yield_now().await;
            self.visits.push((instruction.id.clone(), is_root));
        }
    }

    fn arena(configs: Vec<InstructionConfig>) -> InstructionArena {
        InstructionArena::build(&configs).unwrap()
    }

    #[tokio::test]
    async fn test_before_self_after_order() {
        let arena = arena(vec![
            InstructionConfig::new("a", "t", "tag").with_before("b").with_after("c"),
            InstructionConfig::new("b", "t", "tag"),
            InstructionConfig::new("c", "t", "tag"),
        ]);
        let mut recorder = Recorder::default();
        Walker::new(&arena)
            .walk(arena.find("a").unwrap(), &mut recorder)
            .await
            .unwrap();

        assert_eq!(
            recorder.visits,
            vec![
                ("b".to_string(), false),
                ("a".to_string(), true),
                ("c".to_string(), false)
            ]
        );
    }

    #[test]
    fn test_nested_chains() {
        // b runs before a; d before b; c after a; e after c
        let arena = arena(vec![
            InstructionConfig::new("a", "t", "tag").with_before("b").with_after("c"),
            InstructionConfig::new("b", "t", "tag").with_before("d"),
            InstructionConfig::new("c", "t", "tag").with_after("e"),
            InstructionConfig::new("d", "t", "tag"),
            InstructionConfig::new("e", "t", "tag"),
        ]);
        let walker = Walker::new(&arena);
        let ids: Vec<&str> = walker
            .order(arena.find("a").unwrap())
            .unwrap()
            .into_iter()
            .map(|i| arena[i].id.as_str())
            .collect();
        assert_eq!(ids, vec!["d", "b", "a", "c", "e"]);
    }

    #[test]
    fn test_shared_dependency_visited_once() {
        let arena = arena(vec![
            InstructionConfig::new("a", "t", "tag").with_before("b").with_after("c"),
            InstructionConfig::new("b", "t", "tag").with_after("c"),
            InstructionConfig::new("c", "t", "tag"),
        ]);
        let order = Walker::new(&arena).order(arena.find("a").unwrap()).unwrap();
        assert_eq!(order.len(), 3);
    }

    #[tokio::test]
    async fn test_cycle_is_rejected_without_visits() {
        let arena = arena(vec![
            InstructionConfig::new("a", "t", "tag").with_after("b"),
            InstructionConfig::new("b", "t", "tag").with_after("a"),
        ]);
        let mut recorder = Recorder::default();
        let result = Walker::new(&arena)
            .walk(arena.find("a").unwrap(), &mut recorder)
            .await;

        match result {
            Err(WalkError::Cycle { path, .. }) => assert_eq!(path, vec!["a", "b", "a"]),
            other => panic!("Expected cycle, got {:?}", other),
        }
        assert!(recorder.visits.is_empty());
    }

    #[test]
    fn test_self_link_is_a_cycle() {
        let arena = arena(vec![InstructionConfig::new("a", "t", "tag").with_before("a")]);
        assert!(Walker::new(&arena).order(InstructionIndex(0)).is_err());
    }
}
