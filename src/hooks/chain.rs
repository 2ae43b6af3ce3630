use std::collections::HashMap;
use std::sync::Arc;

use crate::app::{FreshetError, Result};
use crate::hooks::{
    FeedContext, FeedStage, Flow, HookError, HookPriority, ItemContext, ItemVerdict,
    OutputContext, Plugin, Stage,
};

/// A plugin registered for one stage.
#[derive(Clone)]
pub struct HookRegistration {
    pub stage: Stage,
    pub priority: HookPriority,
    pub name: String,
    pub plugin: Arc<dyn Plugin>,
}

/// Per-stage ordered hook lists. Built once before a run and only read
/// afterwards, so it is shared between workers without locking.
#[derive(Clone, Default)]
pub struct HookChain {
    by_stage: HashMap<Stage, Vec<HookRegistration>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_plugins(plugins: impl IntoIterator<Item = Arc<dyn Plugin>>) -> Self {
        let mut chain = Self::new();
        for plugin in plugins {
            chain.register(plugin);
        }
        chain
    }

    /// Register `plugin` for every stage it declares.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let name = plugin.name().to_string();
        let priority = plugin.priority();

        let mut stages = plugin.stages();
        stages.sort();
        stages.dedup();

        for stage in stages {
            tracing::debug!("Registering plugin {} for {} ({:?})", name, stage, priority);
            let hooks = self.by_stage.entry(stage).or_default();
            hooks.push(HookRegistration {
                stage,
                priority,
                name: name.clone(),
                plugin: plugin.clone(),
            });
            // Stable: equal (priority, name) keep registration order.
            hooks.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));
        }
    }

    pub fn registrations(&self, stage: Stage) -> &[HookRegistration] {
        self.by_stage
            .get(&stage)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_stage.values().all(Vec::is_empty)
    }

    /// Run the hooks of a per-feed stage.
    ///
    /// Stops at the first hook that answers [`Flow::Skip`] or fails; later
    /// hooks of the stage are not invoked.
    pub fn dispatch(&self, stage: FeedStage, ctx: &mut FeedContext<'_>) -> Result<Flow> {
        let stage_id = Stage::from(stage);

        for reg in self.registrations(stage_id) {
            let outcome = match stage {
                FeedStage::PreFeedDownload => reg.plugin.pre_feed_download(ctx),
                FeedStage::PostFeedDownload => reg.plugin.post_feed_download(ctx),
                FeedStage::PostFeedParse => reg.plugin.post_feed_parse(ctx),
                FeedStage::PreFeedOutput => reg.plugin.pre_feed_output(ctx),
            };

            match outcome.map_err(|e| hook_error(reg, e))? {
                Flow::Continue => {
                    tracing::trace!("{} at {}: continue", reg.name, stage_id);
                }
                Flow::Skip => {
                    tracing::debug!(
                        "{} skipped feed {} at {}",
                        reg.name,
                        ctx.feed.id,
                        stage_id
                    );
                    return Ok(Flow::Skip);
                }
            }
        }

        Ok(Flow::Continue)
    }

    /// Run the `PostFeedProcess` hooks for a single item. A `Drop` from any
    /// hook removes the item and ends dispatch for it.
    pub fn dispatch_item(&self, ctx: &mut ItemContext<'_>) -> Result<ItemVerdict> {
        for reg in self.registrations(Stage::PostFeedProcess) {
            let verdict = reg
                .plugin
                .post_feed_process(ctx)
                .map_err(|e| hook_error(reg, e))?;

            if verdict == ItemVerdict::Drop {
                tracing::debug!(
                    "{} dropped item {:?} from {}",
                    reg.name,
                    ctx.item.display_title(),
                    ctx.feed.id
                );
                return Ok(ItemVerdict::Drop);
            }
        }

        Ok(ItemVerdict::Keep)
    }

    /// Run the `PostOutput` hooks. Every hook runs even if an earlier one
    /// failed; the failures are returned.
    pub fn dispatch_post_output(&self, ctx: &OutputContext<'_>) -> Vec<FreshetError> {
        let mut errors = Vec::new();

        for reg in self.registrations(Stage::PostOutput) {
            if let Err(e) = reg.plugin.post_output(ctx) {
                let err = hook_error(reg, e);
                tracing::warn!("{}", err);
                errors.push(err);
            }
        }

        errors
    }
}

fn hook_error(reg: &HookRegistration, source: HookError) -> FreshetError {
    FreshetError::Hook {
        plugin: reg.name.clone(),
        stage: reg.stage,
        source,
    }
}
