//! Rebuild planning for every stateful GPU-side component.
//!
//! [`DependencyGraph`] is a small, backend-independent DAG over node indices
//! with a bounded fixed-point closure. [`ResourceDependencyGraph`] instantiates
//! it for the renderer's [`ResourceKind`]s and drives teardown and rebuild
//! through a [`ResourceHost`].

use std::fmt;

use crate::quicksave::QuickLoadChanges;
use crate::request::UpdateRequest;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("edge references node {node} but the graph has {count} nodes")]
    UnknownNode { node: usize, count: usize },
    #[error("dependency cycle through node {0}")]
    Cycle(usize),
    #[error("seed vector has {actual} entries, expected {expected}")]
    SeedLength { expected: usize, actual: usize },
    #[error("propagation did not converge within {0} iterations")]
    NoConvergence(usize),
}

/// Result of [`DependencyGraph::close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    pub flags: Vec<bool>,
    /// Sweeps performed, including the final sweep that observed no change.
    pub iterations: usize,
}

/// Directed acyclic "requires" relation over `0..node_count`.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    prerequisites: Vec<Vec<usize>>,
    depth: usize,
}

impl DependencyGraph {
    /// Builds the graph from `(dependent, prerequisite)` pairs. Cycles are
    /// rejected since they would make the closure bound meaningless.
    pub fn new(node_count: usize, edges: &[(usize, usize)]) -> Result<Self, GraphError> {
        let mut prerequisites = vec![Vec::new(); node_count];
        for &(dependent, prerequisite) in edges {
            for node in [dependent, prerequisite] {
                if node >= node_count {
                    return Err(GraphError::UnknownNode {
                        node,
                        count: node_count,
                    });
                }
            }
            if !prerequisites[dependent].contains(&prerequisite) {
                prerequisites[dependent].push(prerequisite);
            }
        }
        let depth = longest_path(&prerequisites)?;
        Ok(Self {
            prerequisites,
            depth,
        })
    }

    pub fn node_count(&self) -> usize {
        self.prerequisites.len()
    }

    pub fn prerequisites(&self, node: usize) -> &[usize] {
        &self.prerequisites[node]
    }

    /// Number of edges on the longest prerequisite chain.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Maximum number of sweeps [`close`](Self::close) may take.
    ///
    /// Each sweep extends every flag by exactly one edge, so after `depth`
    /// sweeps the closure is complete and one more sweep observes that
    /// nothing changed: `depth + 1` always suffices for an acyclic graph.
    pub fn iteration_bound(&self) -> usize {
        self.depth + 1
    }

    /// Marks every node that transitively requires a seeded node.
    pub fn close(&self, seeds: &[bool]) -> Result<Closure, GraphError> {
        if seeds.len() != self.node_count() {
            return Err(GraphError::SeedLength {
                expected: self.node_count(),
                actual: seeds.len(),
            });
        }

        let bound = self.iteration_bound();
        let mut flags = seeds.to_vec();
        for iteration in 1..=bound {
            let next: Vec<bool> = self
                .prerequisites
                .iter()
                .enumerate()
                .map(|(node, prereqs)| flags[node] || prereqs.iter().any(|&p| flags[p]))
                .collect();
            if next == flags {
                return Ok(Closure {
                    flags,
                    iterations: iteration,
                });
            }
            flags = next;
        }
        Err(GraphError::NoConvergence(bound))
    }
}

fn longest_path(prerequisites: &[Vec<usize>]) -> Result<usize, GraphError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Unvisited,
        Active,
        Done(usize),
    }

    fn visit(node: usize, prerequisites: &[Vec<usize>], marks: &mut [Mark]) -> Result<usize, GraphError> {
        match marks[node] {
            Mark::Done(length) => return Ok(length),
            Mark::Active => return Err(GraphError::Cycle(node)),
            Mark::Unvisited => {}
        }
        marks[node] = Mark::Active;
        let mut length = 0;
        for &prerequisite in &prerequisites[node] {
            length = length.max(visit(prerequisite, prerequisites, marks)? + 1);
        }
        marks[node] = Mark::Done(length);
        Ok(length)
    }

    let mut marks = vec![Mark::Unvisited; prerequisites.len()];
    let mut depth = 0;
    for node in 0..prerequisites.len() {
        depth = depth.max(visit(node, prerequisites, &mut marks)?);
    }
    Ok(depth)
}

/// Stateful components owned by the renderer, in forward build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    DeviceSurface,
    PrecomputedTables,
    Scene,
    RenderTargets,
    RenderPass,
    ConstantBuffers,
    LightBuffers,
    LightTextures,
    GeometryStage,
    ShadingStage,
    AccumulateStage,
    CopyStage,
    UiStage,
    FrameScheduler,
}

impl ResourceKind {
    pub const COUNT: usize = 14;

    /// Every kind in an order where prerequisites precede dependents.
    pub const ALL: [ResourceKind; Self::COUNT] = [
        ResourceKind::DeviceSurface,
        ResourceKind::PrecomputedTables,
        ResourceKind::Scene,
        ResourceKind::RenderTargets,
        ResourceKind::RenderPass,
        ResourceKind::ConstantBuffers,
        ResourceKind::LightBuffers,
        ResourceKind::LightTextures,
        ResourceKind::GeometryStage,
        ResourceKind::ShadingStage,
        ResourceKind::AccumulateStage,
        ResourceKind::CopyStage,
        ResourceKind::UiStage,
        ResourceKind::FrameScheduler,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::DeviceSurface => "device surface",
            ResourceKind::PrecomputedTables => "precomputed tables",
            ResourceKind::Scene => "scene",
            ResourceKind::RenderTargets => "render targets",
            ResourceKind::RenderPass => "render pass",
            ResourceKind::ConstantBuffers => "constant buffers",
            ResourceKind::LightBuffers => "light buffers",
            ResourceKind::LightTextures => "light textures",
            ResourceKind::GeometryStage => "geometry stage",
            ResourceKind::ShadingStage => "shading stage",
            ResourceKind::AccumulateStage => "accumulate stage",
            ResourceKind::CopyStage => "copy stage",
            ResourceKind::UiStage => "ui stage",
            ResourceKind::FrameScheduler => "frame scheduler",
        }
    }

    /// Resources whose rebuild invalidates this one.
    pub fn prerequisites(self) -> &'static [ResourceKind] {
        use ResourceKind::*;
        match self {
            DeviceSurface | PrecomputedTables | Scene | LightBuffers | LightTextures => &[],
            RenderTargets => &[DeviceSurface],
            RenderPass => &[DeviceSurface, RenderTargets],
            ConstantBuffers => &[DeviceSurface],
            GeometryStage => &[DeviceSurface, Scene, ConstantBuffers, RenderTargets, RenderPass],
            ShadingStage => &[
                DeviceSurface,
                PrecomputedTables,
                Scene,
                RenderTargets,
                ConstantBuffers,
                LightBuffers,
                LightTextures,
                GeometryStage,
            ],
            // Both bind the per-slot constant buffers for sample count and
            // packing mode.
            AccumulateStage => &[DeviceSurface, RenderTargets, RenderPass, ConstantBuffers],
            CopyStage => &[DeviceSurface, RenderTargets, RenderPass, ConstantBuffers],
            UiStage => &[DeviceSurface, RenderTargets],
            FrameScheduler => &[DeviceSurface],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One flag per [`ResourceKind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceFlags([bool; ResourceKind::COUNT]);

impl ResourceFlags {
    pub fn none() -> Self {
        Self::default()
    }

    /// Resources directly invalidated by `request`, before propagation.
    pub fn seeded_from(request: &UpdateRequest) -> Self {
        use ResourceKind::*;
        let r = request;
        let mut flags = Self::none();
        flags.set(DeviceSurface, r.window_resize);
        flags.set(PrecomputedTables, r.startup);
        flags.set(Scene, r.startup || r.scene_reload);
        flags.set(RenderTargets, r.startup);
        flags.set(RenderPass, r.startup);
        flags.set(
            ConstantBuffers,
            r.startup || r.light_count_changed || r.shading_changed,
        );
        flags.set(LightBuffers, r.startup || r.light_count_changed);
        flags.set(
            LightTextures,
            r.startup || r.scene_reload || r.light_count_changed || r.light_texture_changed,
        );
        flags.set(GeometryStage, r.startup || r.reload_shaders);
        flags.set(
            ShadingStage,
            r.startup || r.shading_changed || r.reload_shaders,
        );
        flags.set(AccumulateStage, r.startup || r.reload_shaders);
        flags.set(CopyStage, r.startup || r.reload_shaders);
        flags.set(UiStage, r.startup || r.reload_shaders);
        flags.set(FrameScheduler, r.startup);
        flags
    }

    pub fn get(&self, kind: ResourceKind) -> bool {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: ResourceKind, value: bool) {
        self.0[kind.index()] = value;
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|&flag| flag)
    }

    pub fn union(mut self, other: ResourceFlags) -> Self {
        for (flag, other) in self.0.iter_mut().zip(other.0) {
            *flag |= other;
        }
        self
    }

    /// Flagged kinds in forward dependency order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = ResourceKind> + '_ {
        ResourceKind::ALL
            .into_iter()
            .filter(move |kind| self.get(*kind))
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    fn from_slice(flags: &[bool]) -> Self {
        let mut out = Self::none();
        for (slot, &flag) in out.0.iter_mut().zip(flags) {
            *slot = flag;
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    Ready,
    /// Zero-area window; nothing can be rendered until it is restored.
    Minimized,
}

/// The renderer side of [`ResourceDependencyGraph::apply`].
///
/// `destroy` must tolerate kinds that are already absent. Every other
/// fallible method reports through `anyhow` so that the graph can attach the
/// failing resource kind.
pub trait ResourceHost {
    /// Current drawable size in pixels.
    fn surface_extent(&self) -> (u32, u32);
    /// Asks the windowing layer for a new drawable size.
    fn request_window_size(&mut self, width: u32, height: u32);
    fn quick_save(&mut self) -> anyhow::Result<()>;
    fn quick_load(&mut self) -> anyhow::Result<QuickLoadChanges>;
    /// Blocks until no submitted GPU work is outstanding.
    fn wait_idle(&mut self) -> anyhow::Result<()>;
    fn destroy(&mut self, kind: ResourceKind);
    fn resize_surface(&mut self) -> anyhow::Result<SurfaceStatus>;
    fn create(&mut self, kind: ResourceKind) -> anyhow::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error("failed to wait for outstanding GPU work: {0:#}")]
    Idle(anyhow::Error),
    #[error("failed to resize the device surface: {0:#}")]
    Resize(anyhow::Error),
    #[error("failed to rebuild {kind}: {cause:#}")]
    Create {
        kind: ResourceKind,
        cause: anyhow::Error,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Accumulated samples no longer describe the current scene.
    pub reset_accumulation: bool,
    pub rebuilt: ResourceFlags,
    /// The surface could not be resized because the window has no area.
    /// Affected resources stay destroyed until a later apply succeeds.
    pub minimized: bool,
}

/// Static resource graph plus the resources left destroyed by a minimized
/// window.
#[derive(Debug, Clone)]
pub struct ResourceDependencyGraph {
    graph: DependencyGraph,
    pending: ResourceFlags,
}

impl ResourceDependencyGraph {
    pub fn new() -> Result<Self, GraphError> {
        let mut edges = Vec::new();
        for kind in ResourceKind::ALL {
            for prerequisite in kind.prerequisites() {
                edges.push((kind.index(), prerequisite.index()));
            }
        }
        Ok(Self {
            graph: DependencyGraph::new(ResourceKind::COUNT, &edges)?,
            pending: ResourceFlags::none(),
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// True while resources are torn down awaiting a usable surface.
    pub fn has_pending(&self) -> bool {
        self.pending.any()
    }

    /// Seeds from `request` and returns the full rebuild set.
    pub fn propagate(&self, seeds: ResourceFlags) -> Result<ResourceFlags, GraphError> {
        let closure = self.graph.close(seeds.as_slice())?;
        tracing::trace!(
            iterations = closure.iterations,
            bound = self.graph.iteration_bound(),
            "resource closure converged"
        );
        Ok(ResourceFlags::from_slice(&closure.flags))
    }

    /// Performs quick save/load, then tears down and rebuilds everything
    /// `request` invalidates. Any error leaves the renderer unusable.
    pub fn apply<H>(&mut self, mut request: UpdateRequest, host: &mut H) -> Result<ApplyOutcome, RebuildError>
    where
        H: ResourceHost + ?Sized,
    {
        if request.quick_save {
            if let Err(err) = host.quick_save() {
                tracing::warn!(error = %format!("{err:#}"), "quick save failed");
            }
        }

        if let Some((width, height)) = request.requested_size {
            if (width, height) != host.surface_extent() {
                host.request_window_size(width, height);
                request.window_resize = true;
            }
        }

        if !request.seeds_rebuild() && !request.quick_load && !self.pending.any() {
            return Ok(ApplyOutcome::default());
        }

        if request.quick_load {
            match host.quick_load() {
                Ok(changes) => {
                    request.light_count_changed |= changes.light_count_changed;
                    request.light_texture_changed |= changes.light_texture_changed;
                }
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "quick load failed");
                }
            }
        }

        let seeds = ResourceFlags::seeded_from(&request).union(self.pending);
        let flags = self.propagate(seeds)?;

        host.wait_idle().map_err(RebuildError::Idle)?;
        for kind in flags.iter().rev() {
            if kind != ResourceKind::DeviceSurface {
                tracing::debug!(resource = %kind, "destroying");
                host.destroy(kind);
            }
        }

        if flags.get(ResourceKind::DeviceSurface) {
            match host.resize_surface().map_err(RebuildError::Resize)? {
                SurfaceStatus::Ready => {}
                SurfaceStatus::Minimized => {
                    tracing::debug!("surface minimized; deferring rebuild");
                    self.pending = flags;
                    return Ok(ApplyOutcome {
                        minimized: true,
                        ..ApplyOutcome::default()
                    });
                }
            }
        }

        let mut rebuilt = ResourceFlags::none();
        for kind in flags.iter() {
            if kind == ResourceKind::DeviceSurface {
                rebuilt.set(kind, true);
                continue;
            }
            tracing::debug!(resource = %kind, "creating");
            host.create(kind)
                .map_err(|cause| RebuildError::Create { kind, cause })?;
            rebuilt.set(kind, true);
        }
        self.pending = ResourceFlags::none();

        Ok(ApplyOutcome {
            reset_accumulation: true,
            rebuilt,
            minimized: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(length: usize) -> DependencyGraph {
        let edges: Vec<_> = (1..length).map(|node| (node, node - 1)).collect();
        DependencyGraph::new(length, &edges).expect("chain graph")
    }

    #[test]
    fn chain_depth_and_worst_case_iterations() {
        let graph = chain(6);
        assert_eq!(graph.depth(), 5);
        let mut seeds = vec![false; 6];
        seeds[0] = true;
        let closure = graph.close(&seeds).expect("converges");
        assert!(closure.flags.iter().all(|&flag| flag));
        assert_eq!(closure.iterations, graph.iteration_bound());
    }

    #[test]
    fn closure_is_a_fixed_point() {
        let graph = ResourceDependencyGraph::new().expect("static graph");
        let seeds = ResourceFlags::seeded_from(&UpdateRequest {
            scene_reload: true,
            ..UpdateRequest::default()
        });
        let once = graph.propagate(seeds).expect("converges");
        let twice = graph.propagate(once).expect("converges");
        assert_eq!(once, twice);
    }

    #[test]
    fn static_graph_bound_exceeds_depth() {
        let graph = ResourceDependencyGraph::new().expect("static graph");
        let inner = graph.graph();
        assert!(inner.iteration_bound() > inner.depth());
        // surface -> targets -> pass -> geometry -> shading
        assert_eq!(inner.depth(), 4);

        let mut seeds = ResourceFlags::none();
        seeds.set(ResourceKind::DeviceSurface, true);
        let closure = inner.close(seeds.as_slice()).expect("converges");
        assert!(closure.iterations <= inner.iteration_bound());
    }

    #[test]
    fn build_order_respects_prerequisites() {
        for (position, kind) in ResourceKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), position);
            for prerequisite in kind.prerequisites() {
                assert!(
                    prerequisite.index() < kind.index(),
                    "{prerequisite} must be built before {kind}"
                );
            }
        }
    }

    #[test]
    fn rejects_cycles_and_unknown_nodes() {
        assert_eq!(
            DependencyGraph::new(2, &[(0, 1), (1, 0)]).unwrap_err(),
            GraphError::Cycle(0)
        );
        assert!(matches!(
            DependencyGraph::new(2, &[(0, 5)]).unwrap_err(),
            GraphError::UnknownNode { node: 5, .. }
        ));
    }

    #[test]
    fn resize_invalidates_everything_surface_bound() {
        let graph = ResourceDependencyGraph::new().expect("static graph");
        let flags = graph
            .propagate(ResourceFlags::seeded_from(&UpdateRequest {
                window_resize: true,
                ..UpdateRequest::default()
            }))
            .expect("converges");
        assert!(flags.get(ResourceKind::ShadingStage));
        assert!(flags.get(ResourceKind::FrameScheduler));
        assert!(!flags.get(ResourceKind::Scene));
        assert!(!flags.get(ResourceKind::LightBuffers));
        assert!(!flags.get(ResourceKind::PrecomputedTables));
    }

    #[derive(Default)]
    struct RecordingHost {
        extent: (u32, u32),
        log: Vec<String>,
        minimized: bool,
        fail_on: Option<ResourceKind>,
        light_changes: QuickLoadChanges,
    }

    impl ResourceHost for RecordingHost {
        fn surface_extent(&self) -> (u32, u32) {
            self.extent
        }

        fn request_window_size(&mut self, width: u32, height: u32) {
            self.log.push(format!("window {width}x{height}"));
            self.extent = (width, height);
        }

        fn quick_save(&mut self) -> anyhow::Result<()> {
            self.log.push("save".into());
            Ok(())
        }

        fn quick_load(&mut self) -> anyhow::Result<QuickLoadChanges> {
            self.log.push("load".into());
            Ok(self.light_changes)
        }

        fn wait_idle(&mut self) -> anyhow::Result<()> {
            self.log.push("idle".into());
            Ok(())
        }

        fn destroy(&mut self, kind: ResourceKind) {
            self.log.push(format!("destroy {kind}"));
        }

        fn resize_surface(&mut self) -> anyhow::Result<SurfaceStatus> {
            self.log.push("resize".into());
            Ok(if self.minimized {
                SurfaceStatus::Minimized
            } else {
                SurfaceStatus::Ready
            })
        }

        fn create(&mut self, kind: ResourceKind) -> anyhow::Result<()> {
            if self.fail_on == Some(kind) {
                anyhow::bail!("boom");
            }
            self.log.push(format!("create {kind}"));
            Ok(())
        }
    }

    #[test]
    fn empty_request_does_no_work() {
        let mut graph = ResourceDependencyGraph::new().expect("static graph");
        let mut host = RecordingHost {
            extent: (800, 600),
            ..RecordingHost::default()
        };
        let outcome = graph
            .apply(UpdateRequest::default(), &mut host)
            .expect("apply");
        assert!(!outcome.reset_accumulation);
        assert!(host.log.is_empty());

        let same_size = UpdateRequest {
            requested_size: Some((800, 600)),
            ..UpdateRequest::default()
        };
        graph.apply(same_size, &mut host).expect("apply");
        assert!(host.log.is_empty());
    }

    #[test]
    fn teardown_is_reverse_of_rebuild() {
        let mut graph = ResourceDependencyGraph::new().expect("static graph");
        let mut host = RecordingHost {
            extent: (800, 600),
            ..RecordingHost::default()
        };
        let outcome = graph
            .apply(
                UpdateRequest {
                    reload_shaders: true,
                    ..UpdateRequest::default()
                },
                &mut host,
            )
            .expect("apply");
        assert!(outcome.reset_accumulation);

        let destroyed: Vec<_> = host
            .log
            .iter()
            .filter_map(|line| line.strip_prefix("destroy "))
            .collect();
        let mut created: Vec<_> = host
            .log
            .iter()
            .filter_map(|line| line.strip_prefix("create "))
            .collect();
        created.reverse();
        assert_eq!(destroyed, created);
        assert_eq!(host.log.first().map(String::as_str), Some("idle"));
        assert!(destroyed.contains(&"shading stage"));
        assert!(!destroyed.contains(&"scene"));
    }

    #[test]
    fn size_change_resizes_window_and_surface() {
        let mut graph = ResourceDependencyGraph::new().expect("static graph");
        let mut host = RecordingHost {
            extent: (800, 600),
            ..RecordingHost::default()
        };
        let outcome = graph
            .apply(
                UpdateRequest {
                    requested_size: Some((1920, 1080)),
                    ..UpdateRequest::default()
                },
                &mut host,
            )
            .expect("apply");
        assert!(outcome.rebuilt.get(ResourceKind::DeviceSurface));
        assert!(outcome.rebuilt.get(ResourceKind::RenderTargets));
        assert_eq!(host.log[0], "window 1920x1080");
        assert!(host.log.contains(&"resize".to_string()));
    }

    #[test]
    fn minimized_surface_defers_rebuild_until_restored() {
        let mut graph = ResourceDependencyGraph::new().expect("static graph");
        let mut host = RecordingHost {
            extent: (800, 600),
            minimized: true,
            ..RecordingHost::default()
        };
        let resize = UpdateRequest {
            window_resize: true,
            scene_reload: true,
            ..UpdateRequest::default()
        };
        let outcome = graph.apply(resize, &mut host).expect("apply");
        assert!(outcome.minimized);
        assert!(!outcome.reset_accumulation);
        assert!(graph.has_pending());
        assert!(!host.log.iter().any(|line| line.starts_with("create")));

        host.minimized = false;
        host.log.clear();
        let outcome = graph
            .apply(UpdateRequest::default(), &mut host)
            .expect("apply");
        assert!(outcome.reset_accumulation);
        assert!(outcome.rebuilt.get(ResourceKind::Scene));
        assert!(!graph.has_pending());
    }

    #[test]
    fn rebuild_failure_aborts_remaining_work() {
        let mut graph = ResourceDependencyGraph::new().expect("static graph");
        let mut host = RecordingHost {
            extent: (800, 600),
            fail_on: Some(ResourceKind::GeometryStage),
            ..RecordingHost::default()
        };
        let err = graph
            .apply(UpdateRequest::startup(), &mut host)
            .unwrap_err();
        assert!(matches!(
            err,
            RebuildError::Create {
                kind: ResourceKind::GeometryStage,
                ..
            }
        ));
        assert!(!host.log.contains(&"create shading stage".to_string()));
    }

    #[test]
    fn quick_load_light_changes_extend_rebuild() {
        let mut graph = ResourceDependencyGraph::new().expect("static graph");
        let mut host = RecordingHost {
            extent: (800, 600),
            light_changes: QuickLoadChanges {
                light_count_changed: true,
                light_texture_changed: false,
            },
            ..RecordingHost::default()
        };
        let outcome = graph
            .apply(
                UpdateRequest {
                    quick_load: true,
                    ..UpdateRequest::default()
                },
                &mut host,
            )
            .expect("apply");
        assert!(outcome.reset_accumulation);
        assert!(outcome.rebuilt.get(ResourceKind::LightBuffers));
        assert!(outcome.rebuilt.get(ResourceKind::ShadingStage));
        assert!(!outcome.rebuilt.get(ResourceKind::Scene));
    }

    #[test]
    fn quick_load_without_light_changes_still_resets() {
        let mut graph = ResourceDependencyGraph::new().expect("static graph");
        let mut host = RecordingHost {
            extent: (800, 600),
            ..RecordingHost::default()
        };
        let outcome = graph
            .apply(
                UpdateRequest {
                    quick_load: true,
                    ..UpdateRequest::default()
                },
                &mut host,
            )
            .expect("apply");
        assert!(outcome.reset_accumulation);
        assert!(!outcome.rebuilt.any());
    }
}
