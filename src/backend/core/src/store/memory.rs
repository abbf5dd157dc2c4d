//! In-memory propagation store.
//!
//! Each cascade lives behind its own `RwLock`; the map only guards lookup of
//! the per-root handle, so writers on different roots never contend and a
//! writer on one root never blocks readers of another.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use super::{NodeInsertion, PropagationStore, StoreSnapshot};
use crate::aggregator::{Aggregator, SummaryRebuild, TreeAudit};
use crate::cascade::{
    new_share_root, CascadeRecord, CascadeSummary, CascadeTree, ContentRef, EngagementAction,
    NodeId, PropagationNode, RootId, ShareRoot, UserId,
};
use crate::error::{CascadeError, Result};
use crate::telemetry::CascadeMetrics;

type CascadeHandle = Arc<RwLock<CascadeTree>>;

/// Store keeping every cascade in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cascades: DashMap<RootId, CascadeHandle>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cascades held.
    pub fn len(&self) -> usize {
        self.cascades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cascades.is_empty()
    }

    /// Clone the handle out so the map shard is released before locking.
    fn handle(&self, root_id: RootId) -> Result<CascadeHandle> {
        self.cascades
            .get(&root_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CascadeError::root_not_found(root_id))
    }

    fn handles(&self) -> Vec<CascadeHandle> {
        self.cascades
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn read<T>(&self, root_id: RootId, f: impl FnOnce(&CascadeTree) -> Result<T>) -> Result<T> {
        let handle = self.handle(root_id)?;
        let tree = handle.read();
        f(&tree)
    }

    fn write<T>(
        &self,
        root_id: RootId,
        f: impl FnOnce(&mut CascadeTree) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(root_id)?;
        let mut tree = handle.write();
        f(&mut tree)
    }
}

impl PropagationStore for MemoryStore {
    #[instrument(skip(self))]
    fn create_root(
        &self,
        candidate_id: Option<RootId>,
        origin_user: UserId,
        content_ref: ContentRef,
    ) -> Result<ShareRoot> {
        let root_id = candidate_id.unwrap_or_default();

        let root = match self.cascades.entry(root_id) {
            Entry::Occupied(_) => return Err(CascadeError::duplicate_root(root_id)),
            Entry::Vacant(slot) => {
                let root = new_share_root(root_id, origin_user, content_ref);
                slot.insert(Arc::new(RwLock::new(CascadeTree::new(root.clone()))));
                root
            }
        };

        CascadeMetrics::root_created();
        info!(
            root_id = %root.id,
            root_node_id = %root.root_node_id,
            content_ref = %root.content_ref,
            "Share root created"
        );
        Ok(root)
    }

    #[instrument(skip(self))]
    fn append_node(
        &self,
        root_id: RootId,
        acting_user: UserId,
        parent_id: Option<NodeId>,
    ) -> Result<NodeInsertion> {
        let (node, summary) = self.write(root_id, |tree| {
            let node = tree.insert(acting_user, parent_id)?;
            Ok((node, tree.summary().clone()))
        })?;

        CascadeMetrics::node_inserted(node.depth);
        info!(
            root_id = %root_id,
            node_id = %node.id,
            depth = node.depth,
            total_reach = summary.total_reach,
            max_depth = summary.max_depth,
            "Propagation node inserted"
        );
        Ok(NodeInsertion { node, summary })
    }

    fn get_root(&self, root_id: RootId) -> Result<ShareRoot> {
        self.read(root_id, |tree| Ok(tree.root().clone()))
    }

    fn get_summary(&self, root_id: RootId) -> Result<CascadeSummary> {
        self.read(root_id, |tree| Ok(tree.summary().clone()))
    }

    fn get_node(&self, root_id: RootId, node_id: NodeId) -> Result<PropagationNode> {
        self.read(root_id, |tree| {
            tree.node(node_id)
                .cloned()
                .ok_or_else(|| CascadeError::node_not_found(root_id, node_id))
        })
    }

    fn find_participant(&self, root_id: RootId, user: &UserId) -> Result<Option<PropagationNode>> {
        self.read(root_id, |tree| Ok(tree.participant(user).cloned()))
    }

    fn list_children(&self, root_id: RootId, node_id: NodeId) -> Result<Vec<PropagationNode>> {
        self.read(root_id, |tree| tree.children(node_id))
    }

    fn list_nodes(&self, root_id: RootId) -> Result<Vec<PropagationNode>> {
        self.read(root_id, |tree| Ok(tree.to_record().nodes))
    }

    fn cascade(&self, root_id: RootId) -> Result<CascadeRecord> {
        self.read(root_id, |tree| Ok(tree.to_record()))
    }

    fn frontier(&self, root_id: RootId) -> Result<Vec<PropagationNode>> {
        self.read(root_id, |tree| Ok(tree.frontier()))
    }

    fn path_to(&self, root_id: RootId, user: &UserId) -> Result<Option<Vec<PropagationNode>>> {
        self.read(root_id, |tree| Ok(tree.path_to(user)))
    }

    #[instrument(skip(self))]
    fn set_flag(
        &self,
        root_id: RootId,
        user: &UserId,
        action: EngagementAction,
    ) -> Result<PropagationNode> {
        let node = self.write(root_id, |tree| tree.set_flag(user, action))?;
        debug!(root_id = %root_id, node_id = %node.id, action = %action, "Engagement flag set");
        Ok(node)
    }

    #[instrument(skip(self))]
    fn rebuild_summary(&self, root_id: RootId) -> Result<SummaryRebuild> {
        let rebuild = self.write(root_id, |tree| Ok(tree.rebuild_summary()))?;
        CascadeMetrics::summary_rebuilt(rebuild.drifted);
        info!(
            root_id = %root_id,
            drifted = rebuild.drifted,
            total_reach = rebuild.after.total_reach,
            max_depth = rebuild.after.max_depth,
            "Cascade summary rebuilt"
        );
        Ok(rebuild)
    }

    fn audit(&self, root_id: RootId) -> Result<TreeAudit> {
        self.read(root_id, |tree| Ok(Aggregator::audit(tree)))
    }

    fn root_ids(&self) -> Vec<RootId> {
        let mut roots: Vec<_> = self
            .handles()
            .into_iter()
            .map(|handle| {
                let tree = handle.read();
                (tree.root().created_at, tree.id())
            })
            .collect();
        roots.sort();
        roots.into_iter().map(|(_, id)| id).collect()
    }

    fn snapshot(&self) -> StoreSnapshot {
        let mut cascades: Vec<CascadeRecord> = self
            .handles()
            .into_iter()
            .map(|handle| handle.read().to_record())
            .collect();
        cascades.sort_by(|a, b| {
            a.root
                .created_at
                .cmp(&b.root.created_at)
                .then(a.root.id.cmp(&b.root.id))
        });
        StoreSnapshot::new(cascades)
    }

    #[instrument(skip(self, snapshot), fields(cascades = snapshot.cascades.len()))]
    fn restore(&self, snapshot: StoreSnapshot) -> Result<Vec<SummaryRebuild>> {
        let mut trees: Vec<CascadeTree> = Vec::with_capacity(snapshot.cascades.len());
        let mut rebuilds = Vec::with_capacity(snapshot.cascades.len());
        let mut seen = HashSet::with_capacity(snapshot.cascades.len());

        for record in snapshot.cascades {
            let root_id = record.root.id;
            if self.cascades.contains_key(&root_id) || !seen.insert(root_id) {
                return Err(CascadeError::duplicate_root(root_id));
            }
            let (tree, rebuild) = CascadeTree::from_record(record)?;
            CascadeMetrics::summary_rebuilt(rebuild.drifted);
            trees.push(tree);
            rebuilds.push(rebuild);
        }

        let restored = trees.len();
        let mut installed = Vec::with_capacity(restored);
        for tree in trees {
            let root_id = tree.id();
            match self.cascades.entry(root_id) {
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(RwLock::new(tree)));
                    installed.push(root_id);
                }
                Entry::Occupied(_) => {
                    // Created concurrently after the check above.
                    for id in installed {
                        self.cascades.remove(&id);
                    }
                    return Err(CascadeError::duplicate_root(root_id));
                }
            }
        }

        info!(
            restored,
            drifted = rebuilds.iter().filter(|r| r.drifted).count(),
            "Store restored from snapshot"
        );
        Ok(rebuilds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn seeded() -> (MemoryStore, ShareRoot) {
        let store = MemoryStore::new();
        let root = store
            .create_root(None, "alice".into(), ContentRef::new("track-1"))
            .unwrap();
        (store, root)
    }

    #[test]
    fn test_create_root_seeds_summary() {
        let (store, root) = seeded();
        let summary = store.get_summary(root.id).unwrap();
        assert_eq!(summary.total_reach, 1);
        assert_eq!(summary.max_depth, 0);
        assert_eq!(store.len(), 1);

        let root_node = store.get_node(root.id, root.root_node_id).unwrap();
        assert_eq!(root_node.acting_user, UserId::new("alice"));
        assert_eq!(root_node.depth, 0);
    }

    #[test]
    fn test_candidate_id_collision() {
        let (store, root) = seeded();
        let err = store
            .create_root(Some(root.id), "bob".into(), ContentRef::new("track-2"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRoot);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_root() {
        let store = MemoryStore::new();
        let missing = RootId::new();
        for err in [
            store.get_summary(missing).unwrap_err(),
            store.insert_node(missing, "bob".into(), Some(NodeId::new())).unwrap_err(),
            store.frontier(missing).unwrap_err(),
        ] {
            assert_eq!(err.code(), ErrorCode::RootNotFound);
        }
    }

    #[test]
    fn test_root_ids_oldest_first() {
        let store = MemoryStore::new();
        let first = store.create_root(None, "a".into(), "t1".into()).unwrap();
        let second = store.create_root(None, "b".into(), "t2".into()).unwrap();

        let ids = store.root_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&second.id));
        if first.created_at < second.created_at {
            assert_eq!(ids, vec![first.id, second.id]);
        }
    }

    #[test]
    fn test_restore_rejects_collisions_before_installing() {
        let (store, root) = seeded();
        store.insert_node(root.id, "bob".into(), Some(root.root_node_id)).unwrap();
        let snapshot = store.snapshot();

        let err = store.restore(snapshot).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRoot);
        assert_eq!(store.get_summary(root.id).unwrap().total_reach, 2);
    }

    #[test]
    fn test_append_node_returns_summary_of_its_insert() {
        let (store, root) = seeded();
        let bob = store
            .append_node(root.id, "bob".into(), Some(root.root_node_id))
            .unwrap();
        assert_eq!(bob.summary.total_reach, 2);
        assert_eq!(bob.summary.max_depth, 1);

        let carol = store.append_node(root.id, "carol".into(), Some(bob.node.id)).unwrap();
        assert_eq!(carol.node.depth, 2);
        assert_eq!(carol.summary.total_reach, 3);
        assert_eq!(carol.summary.max_depth, 2);
    }

    #[test]
    fn test_restore_racing_create_root_never_overwrites() {
        let source = MemoryStore::new();
        let ids: Vec<RootId> = (0..64)
            .map(|i| {
                let root = source
                    .create_root(None, UserId::new(format!("origin-{i}")), "track".into())
                    .unwrap();
                source
                    .insert_node(root.id, "bob".into(), Some(root.root_node_id))
                    .unwrap();
                root.id
            })
            .collect();
        let snapshot = source.snapshot();

        let store = Arc::new(MemoryStore::new());
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let creator = {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let ids = ids.clone();
            std::thread::spawn(move || {
                barrier.wait();
                ids.iter()
                    .rev()
                    .filter(|id| {
                        store
                            .create_root(Some(**id), "intruder".into(), "other".into())
                            .is_ok()
                    })
                    .count()
            })
        };
        barrier.wait();
        let restored = store.restore(snapshot);
        let created = creator.join().unwrap();

        match restored {
            Ok(rebuilds) => {
                assert_eq!(rebuilds.len(), ids.len());
                assert_eq!(created, 0);
                for id in &ids {
                    assert_eq!(store.get_summary(*id).unwrap().total_reach, 2);
                }
            }
            Err(err) => {
                assert_eq!(err.code(), ErrorCode::DuplicateRoot);
                assert_eq!(store.len(), created);
                for id in store.root_ids() {
                    assert_eq!(store.get_root(id).unwrap().origin_user, UserId::new("intruder"));
                }
            }
        }
    }
}
