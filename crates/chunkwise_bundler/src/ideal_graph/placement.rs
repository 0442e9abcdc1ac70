use std::sync::Arc;

use anyhow::Context;
use chunkwise_core::types::Asset;
use chunkwise_core::types::AssetId;
use chunkwise_core::types::BundleBehavior;
use chunkwise_graph::NodeId;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

use super::builder::AsyncRootNode;
use super::builder::IdealGraphBuilder;
use super::types::Availability;
use super::types::DecisionKind;
use super::types::IdealBundle;
use super::types::IdealBundleEdge;

const PHASE: &str = "placement";

impl IdealGraphBuilder<'_> {
  /// Assigns every asset to the bundles that need it.
  ///
  /// Bundle roots are placed first so the edges they add to the bundle graph are in place before
  /// the remaining assets look for ancestor bundles.
  #[instrument(level = "debug", skip_all)]
  pub(super) fn place_assets(&mut self) -> anyhow::Result<()> {
    let (bundle_roots, assets): (Vec<_>, Vec<_>) = self
      .assets
      .iter()
      .cloned()
      .partition(|asset| self.ideal.bundle_roots.contains_key(&asset.id));

    for asset in &bundle_roots {
      self.place_bundle_root(asset)?;
    }

    for asset in &assets {
      self.place_asset(asset)?;
    }

    debug!(
      bundles = self.ideal.bundle_count(),
      shared_bundles = self.shared_bundles.len(),
      "ideal graph: placed assets"
    );
    Ok(())
  }

  fn place_bundle_root(&mut self, asset: &Arc<Asset>) -> anyhow::Result<()> {
    let bundle_root = self.bundle_root(&asset.id)?.clone();
    let bundle = self.ideal.bundle(bundle_root.bundle_id)?;
    if bundle.env.context.is_isolated() || bundle.bundle_behavior == Some(BundleBehavior::Isolated)
    {
      return Ok(());
    }

    // Bundles importing this root synchronously load its bundle with their group
    for root in self.available_roots(asset) {
      let bundle_group_id = self.bundle_root(&root.id)?.bundle_group_id;
      self
        .ideal
        .connect(bundle_group_id, bundle_root.bundle_id, IdealBundleEdge::Sibling)?;
    }

    if bundle_root.is_bundle_group() {
      self.internalize(asset)?;
    }

    Ok(())
  }

  /// Marks the asset internalized in the async parents that already have it loaded
  fn internalize(&mut self, asset: &Arc<Asset>) -> anyhow::Result<()> {
    let Some(node_id) = self.async_root_graph.get_node_id_by_content_key(&asset.id) else {
      return Ok(());
    };

    let parents = self
      .async_root_graph
      .get_node_ids_connected_to(node_id)
      .into_iter()
      .filter_map(|node_id| match self.async_root_graph.get_node(node_id) {
        Some(AsyncRootNode::BundleRoot(parent)) => Some(parent.clone()),
        _ => None,
      })
      .collect::<Vec<_>>();

    for parent in parents {
      let available = self.is_reachable_from_root(&parent.id, &asset.id)
        || self
          .ancestor_assets
          .get(&parent.id)
          .is_some_and(|assets| assets.contains_key(&asset.id));

      if !available {
        continue;
      }

      let bundle_id = self.bundle_root(&parent.id)?.bundle_id;
      let bundle = self.ideal.bundle_mut(bundle_id)?;
      if bundle.internalized_asset_ids.contains(&asset.id) {
        continue;
      }

      bundle.internalized_asset_ids.push(asset.id.clone());
      trace!(asset_id = %asset.id, bundle_id, "Internalizing async import");
      self.decision(
        PHASE,
        DecisionKind::AssetInternalized {
          asset_id: asset.id.clone(),
          bundle_id,
        },
      );
    }

    Ok(())
  }

  fn place_asset(&mut self, asset: &Arc<Asset>) -> anyhow::Result<()> {
    let roots = self.available_roots(asset);
    if roots.is_empty() {
      trace!(asset_id = %asset.id, "Asset is available in every bundle that reaches it");
      return Ok(());
    }

    let mut bundle_ids = Vec::new();
    let mut shareable = Vec::new();
    for root in roots {
      let bundle_id = self.bundle_root(&root.id)?.bundle_id;
      let bundle = self.ideal.bundle(bundle_id)?;

      // Inline and isolated bundles always carry their own copy
      if bundle.is_inline_or_isolated() || bundle.env.context.is_isolated() {
        self.ideal.bundle_mut(bundle_id)?.add_asset(asset);
        bundle_ids.push(bundle_id);
      } else {
        shareable.push((root.id.clone(), bundle_id));
      }
    }

    let shareable = self.remove_ancestor_roots(shareable);
    if shareable.len() > self.options.config.min_bundles {
      bundle_ids.push(self.add_to_shared_bundle(asset, shareable)?);
    } else {
      for (_, bundle_id) in shareable {
        self.ideal.bundle_mut(bundle_id)?.add_asset(asset);
        bundle_ids.push(bundle_id);
      }
    }

    self.decision(
      PHASE,
      DecisionKind::AssetPlaced {
        asset_id: asset.id.clone(),
        bundle_ids,
      },
    );

    Ok(())
  }

  /// Bundle roots reaching the asset that cannot already rely on it being loaded.
  ///
  /// An asset only conditionally available is deduplicated while every bundle group backing it
  /// still holds more than one copy, and each removal releases one of those copies.
  fn available_roots(&mut self, asset: &Asset) -> Vec<Arc<Asset>> {
    let mut roots = Vec::new();

    for root in self.reachable_roots_of(&asset.id) {
      let availability = self
        .ancestor_assets
        .get(&root.id)
        .and_then(|assets| assets.get(&asset.id))
        .cloned();

      match availability {
        None => roots.push(root),
        Some(Availability::Always) => {}
        Some(Availability::Conditional(group_root_ids)) => {
          if !self.has_spare_copies(&group_root_ids, &asset.id) {
            roots.push(root);
            continue;
          }

          for group_root_id in &group_root_ids {
            if let Some(count) = self
              .asset_refs_in_bundle_group
              .get_mut(group_root_id)
              .and_then(|refs| refs.get_mut(&asset.id))
            {
              *count -= 1;
            }
          }

          self.decision(
            PHASE,
            DecisionKind::AssetDeduplicated {
              asset_id: asset.id.clone(),
              bundle_root_id: root.id.clone(),
            },
          );
        }
      }
    }

    roots
  }

  fn has_spare_copies(&self, group_root_ids: &[AssetId], asset_id: &str) -> bool {
    group_root_ids.iter().all(|group_root_id| {
      self
        .asset_refs_in_bundle_group
        .get(group_root_id)
        .and_then(|refs| refs.get(asset_id))
        .is_some_and(|count| *count > 1)
    })
  }

  /// Drops roots whose bundle already loads the bundle of another root in the list
  fn remove_ancestor_roots(&self, mut roots: Vec<(AssetId, NodeId)>) -> Vec<(AssetId, NodeId)> {
    let mut index = 0;
    while index < roots.len() {
      let bundle_id = roots[index].1;
      let is_ancestor = roots.iter().any(|(_, other_bundle_id)| {
        *other_bundle_id != bundle_id
          && self
            .ideal
            .bundle_graph
            .is_reachable(bundle_id, *other_bundle_id)
      });

      if is_ancestor {
        roots.remove(index);
      } else {
        index += 1;
      }
    }

    roots
  }

  fn add_to_shared_bundle(
    &mut self,
    asset: &Arc<Asset>,
    mut sources: Vec<(AssetId, NodeId)>,
  ) -> anyhow::Result<NodeId> {
    sources.sort_by(|(a, _), (b, _)| a.cmp(b));
    let key = sources
      .iter()
      .map(|(root_id, _)| root_id.as_str())
      .collect::<Vec<_>>()
      .join(",");

    let shared_bundle_id = match self.shared_bundles.get(&key) {
      Some(bundle_id) => *bundle_id,
      None => {
        let source_bundle_ids = sources
          .iter()
          .map(|(_, bundle_id)| *bundle_id)
          .collect::<Vec<_>>();
        let first_source = source_bundle_ids
          .first()
          .copied()
          .with_context(|| format!("shared bundle for {} has no sources", asset.id))?;

        let bundle = IdealBundle::shared(self.ideal.bundle(first_source)?, source_bundle_ids.clone());
        let bundle_id = self.ideal.add_bundle(bundle);
        for source_bundle_id in source_bundle_ids {
          self
            .ideal
            .connect(source_bundle_id, bundle_id, IdealBundleEdge::Shared)?;
        }

        self.ideal.add_dependency_bundle_node(bundle_id);
        self.shared_bundles.insert(key.clone(), bundle_id);

        trace!(bundle_id, %key, "Creating shared bundle");
        self.decision(PHASE, DecisionKind::SharedBundleCreated { bundle_id, key });
        bundle_id
      }
    };

    self.ideal.bundle_mut(shared_bundle_id)?.add_asset(asset);
    Ok(shared_bundle_id)
  }
}
