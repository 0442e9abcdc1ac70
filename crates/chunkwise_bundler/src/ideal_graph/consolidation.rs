use chunkwise_core::types::BundleBehavior;
use chunkwise_graph::NodeId;
use chunkwise_graph::TraversalAction;
use indexmap::IndexSet;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

use super::builder::IdealGraphBuilder;
use super::types::DecisionKind;
use super::types::IdealBundleEdge;
use super::types::IdealBundleNode;
use super::types::SharedBundleRemovalReason;

const PHASE: &str = "consolidation";

impl IdealGraphBuilder<'_> {
  /// Folds shared bundles below `min_bundle_size` back into their source bundles
  #[instrument(level = "debug", skip_all)]
  pub(super) fn remove_small_shared_bundles(&mut self) -> anyhow::Result<()> {
    let min_bundle_size = self.options.config.min_bundle_size;
    let small_bundle_ids = self
      .ideal
      .bundles()
      .filter(|(_, bundle)| bundle.is_shared() && bundle.size < min_bundle_size)
      .map(|(bundle_id, _)| bundle_id)
      .collect::<Vec<_>>();

    for bundle_id in &small_bundle_ids {
      self.dissolve_shared_bundle(*bundle_id, SharedBundleRemovalReason::BelowMinBundleSize)?;
    }

    debug!(
      removed = small_bundle_ids.len(),
      min_bundle_size, "ideal graph: removed small shared bundles"
    );
    Ok(())
  }

  /// Merges same-type siblings into entry bundles, so an entry never waits on a bundle with an
  /// unstable name
  #[instrument(level = "debug", skip_all)]
  pub(super) fn merge_entry_siblings(&mut self) -> anyhow::Result<()> {
    let mut merged = 0;
    let entry_ids = self.entries.keys().cloned().collect::<Vec<_>>();

    for entry_id in entry_ids {
      let entry_bundle_id = self.bundle_root(&entry_id)?.bundle_id;
      let bundle_type = self.ideal.bundle(entry_bundle_id)?.bundle_type.clone();

      let sibling_ids = self
        .ideal
        .bundle_graph
        .get_node_ids_connected_from(entry_bundle_id)
        .into_iter()
        .filter(|sibling_id| {
          self.ideal.bundle(*sibling_id).is_ok_and(|sibling| {
            sibling.bundle_type == bundle_type
              && sibling.bundle_behavior != Some(BundleBehavior::Inline)
          })
        })
        .collect::<IndexSet<_>>();

      for sibling_id in sibling_ids {
        let sibling = self.ideal.bundle(sibling_id)?.clone();

        let entry_bundle = self.ideal.bundle_mut(entry_bundle_id)?;
        for asset in sibling.assets.values() {
          entry_bundle.add_asset(asset);
        }

        self.absorb_bundles_loaded_by(entry_bundle_id, sibling_id)?;

        self.ideal.disconnect(entry_bundle_id, sibling_id);
        if let Some(root_id) = sibling.root_asset_id() {
          if let Some(reachable) = self.ideal.reachable_bundles.get_mut(&entry_id) {
            reachable.shift_remove(root_id);
          }
        }

        merged += 1;
        trace!(sibling_id, entry_bundle_id, "Merging sibling into entry bundle");
        self.decision(
          PHASE,
          DecisionKind::BundleMergedIntoEntry {
            bundle_id: sibling_id,
            entry_bundle_id,
          },
        );

        if sibling.source_bundles.contains(&entry_bundle_id) {
          self.detach_shared_bundle(
            sibling_id,
            &[entry_bundle_id],
            SharedBundleRemovalReason::MergedIntoEntry,
          )?;
        }
      }
    }

    debug!(merged, "ideal graph: merged entry siblings");
    Ok(())
  }

  /// Makes an entry load everything a sibling it absorbs was loading.
  ///
  /// Bundles of the entry's type are copied into it, any other bundle is connected to it.
  fn absorb_bundles_loaded_by(
    &mut self,
    entry_bundle_id: NodeId,
    sibling_id: NodeId,
  ) -> anyhow::Result<()> {
    let bundle_type = self.ideal.bundle(entry_bundle_id)?.bundle_type.clone();
    let mut copied = Vec::new();
    let mut connected = Vec::new();

    self.ideal.bundle_graph.dfs(
      sibling_id,
      &mut |node_id: NodeId,
            node: &IdealBundleNode,
            _parent: Option<NodeId>|
       -> anyhow::Result<TraversalAction> {
        if node_id == sibling_id {
          return Ok(TraversalAction::Continue);
        }

        let IdealBundleNode::Bundle(bundle) = node else {
          return Ok(TraversalAction::SkipChildren);
        };

        if node_id == entry_bundle_id {
          Ok(TraversalAction::SkipChildren)
        } else if bundle.bundle_type == bundle_type
          && bundle.bundle_behavior != Some(BundleBehavior::Inline)
        {
          copied.push(node_id);
          Ok(TraversalAction::Continue)
        } else {
          connected.push(node_id);
          Ok(TraversalAction::SkipChildren)
        }
      },
    )?;

    for bundle_id in copied {
      let assets = self.ideal.bundle(bundle_id)?.assets.clone();
      let entry_bundle = self.ideal.bundle_mut(entry_bundle_id)?;
      for asset in assets.values() {
        entry_bundle.add_asset(asset);
      }
    }

    for bundle_id in connected {
      self
        .ideal
        .connect(entry_bundle_id, bundle_id, IdealBundleEdge::Sibling)?;
    }

    Ok(())
  }

  /// Removes shared bundles from bundle groups loading more bundles than `max_parallel_requests`
  #[instrument(level = "debug", skip_all)]
  pub(super) fn enforce_max_parallel_requests(&mut self) -> anyhow::Result<()> {
    let max_parallel_requests = self.options.config.max_parallel_requests;
    let mut removed = 0;

    for bundle_group_id in self.ideal.bundle_group_bundle_ids.clone() {
      let bundle_type = self.ideal.bundle(bundle_group_id)?.bundle_type.clone();
      let group_bundle_ids = self.ideal.bundles_in_group(bundle_group_id)?;

      let mut requests = 0;
      let mut shared = Vec::new();
      for bundle_id in &group_bundle_ids {
        let bundle = self.ideal.bundle(*bundle_id)?;
        if bundle.bundle_type != bundle_type
          || bundle.bundle_behavior == Some(BundleBehavior::Inline)
        {
          continue;
        }

        requests += 1;
        if bundle.is_shared() {
          shared.push((bundle.size, *bundle_id));
        }
      }

      if requests <= max_parallel_requests {
        continue;
      }

      trace!(
        bundle_group_id,
        requests,
        max_parallel_requests,
        "Bundle group exceeds parallel request limit"
      );

      shared.sort();
      for (_, shared_bundle_id) in shared {
        if requests <= max_parallel_requests {
          break;
        }

        let sources_in_group = self
          .ideal
          .bundle(shared_bundle_id)?
          .source_bundles
          .iter()
          .copied()
          .filter(|source_id| group_bundle_ids.contains(source_id))
          .collect::<Vec<_>>();

        self.detach_shared_bundle(
          shared_bundle_id,
          &sources_in_group,
          SharedBundleRemovalReason::MaxParallelRequests,
        )?;

        requests -= 1;
        removed += 1;
      }
    }

    debug!(
      removed,
      max_parallel_requests, "ideal graph: enforced parallel request limit"
    );
    Ok(())
  }

  /// Copies a shared bundle's assets into some of its sources and stops sharing it with them.
  /// A shared bundle left with at most one source is dissolved.
  fn detach_shared_bundle(
    &mut self,
    shared_bundle_id: NodeId,
    source_ids: &[NodeId],
    reason: SharedBundleRemovalReason,
  ) -> anyhow::Result<()> {
    let shared_bundle = self.ideal.bundle(shared_bundle_id)?.clone();

    for source_id in source_ids {
      let source = self.ideal.bundle_mut(*source_id)?;
      for asset in shared_bundle.assets.values() {
        source.add_asset(asset);
      }

      self.ideal.disconnect(*source_id, shared_bundle_id);
    }

    let remaining = shared_bundle
      .source_bundles
      .iter()
      .copied()
      .filter(|source_id| !source_ids.contains(source_id))
      .collect::<Vec<_>>();

    let dissolve = remaining.len() <= 1;
    self.ideal.bundle_mut(shared_bundle_id)?.source_bundles = remaining;

    if dissolve {
      self.dissolve_shared_bundle(shared_bundle_id, reason)?;
    }

    Ok(())
  }

  /// Copies a shared bundle's assets into every remaining source bundle and removes it
  fn dissolve_shared_bundle(
    &mut self,
    shared_bundle_id: NodeId,
    reason: SharedBundleRemovalReason,
  ) -> anyhow::Result<()> {
    let shared_bundle = self.ideal.remove_bundle(shared_bundle_id)?;

    for source_id in &shared_bundle.source_bundles {
      let source = self.ideal.bundle_mut(*source_id)?;
      for asset in shared_bundle.assets.values() {
        source.add_asset(asset);
      }
    }

    self
      .shared_bundles
      .retain(|_, bundle_id| *bundle_id != shared_bundle_id);

    trace!(shared_bundle_id, ?reason, "Removing shared bundle");
    self.decision(
      PHASE,
      DecisionKind::SharedBundleRemoved {
        bundle_id: shared_bundle_id,
        reason,
      },
    );

    Ok(())
  }
}
