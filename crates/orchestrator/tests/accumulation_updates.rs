use orchestrator::{
    AccumulationState, CaptureByte, QuickLoadChanges, ResourceDependencyGraph, ResourceHost,
    ResourceKind, SurfaceStatus, UpdateRequest,
};

/// Host whose resources always build; only the window extent matters.
struct Headless {
    extent: (u32, u32),
    minimized: bool,
}

impl ResourceHost for Headless {
    fn surface_extent(&self) -> (u32, u32) {
        self.extent
    }

    fn request_window_size(&mut self, width: u32, height: u32) {
        self.extent = (width, height);
    }

    fn quick_save(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn quick_load(&mut self) -> anyhow::Result<QuickLoadChanges> {
        Ok(QuickLoadChanges::default())
    }

    fn wait_idle(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn destroy(&mut self, _kind: ResourceKind) {}

    fn resize_surface(&mut self) -> anyhow::Result<SurfaceStatus> {
        Ok(if self.minimized {
            SurfaceStatus::Minimized
        } else {
            SurfaceStatus::Ready
        })
    }

    fn create(&mut self, _kind: ResourceKind) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One iteration of the frame loop: apply, then present a frame.
fn frame(
    graph: &mut ResourceDependencyGraph,
    host: &mut Headless,
    accumulation: &mut AccumulationState,
    request: UpdateRequest,
) -> bool {
    let outcome = graph.apply(request, host).expect("apply");
    let reset = accumulation.apply_update(&outcome);
    if !outcome.minimized {
        accumulation.advance(true, CaptureByte::None);
    }
    reset
}

#[test]
fn unchanged_frames_add_exactly_one_sample() {
    let mut graph = ResourceDependencyGraph::new().expect("graph");
    let mut host = Headless {
        extent: (640, 360),
        minimized: false,
    };
    let mut accumulation = AccumulationState::default();
    assert!(frame(&mut graph, &mut host, &mut accumulation, UpdateRequest::startup()));
    assert_eq!(accumulation.sample_count(), 1);

    for expected in 2..=6 {
        let reset = frame(&mut graph, &mut host, &mut accumulation, UpdateRequest::default());
        assert!(!reset);
        assert_eq!(accumulation.sample_count(), expected);
    }

    // A size request for the current size changes nothing either.
    let same_size = UpdateRequest {
        requested_size: Some((640, 360)),
        quick_save: true,
        ..UpdateRequest::default()
    };
    assert!(!frame(&mut graph, &mut host, &mut accumulation, same_size));
    assert_eq!(accumulation.sample_count(), 7);
}

#[test]
fn every_reported_change_restarts_the_average() {
    let mut graph = ResourceDependencyGraph::new().expect("graph");
    let mut host = Headless {
        extent: (640, 360),
        minimized: false,
    };
    let mut accumulation = AccumulationState::default();
    frame(&mut graph, &mut host, &mut accumulation, UpdateRequest::startup());

    let changes = [
        UpdateRequest {
            reload_shaders: true,
            ..UpdateRequest::default()
        },
        UpdateRequest {
            quick_load: true,
            ..UpdateRequest::default()
        },
        UpdateRequest {
            requested_size: Some((320, 180)),
            ..UpdateRequest::default()
        },
        UpdateRequest {
            shading_changed: true,
            ..UpdateRequest::default()
        },
    ];
    for request in changes {
        for _ in 0..3 {
            frame(&mut graph, &mut host, &mut accumulation, UpdateRequest::default());
        }
        assert_eq!(accumulation.sample_count(), 4);
        assert!(frame(&mut graph, &mut host, &mut accumulation, request));
        assert_eq!(accumulation.sample_count(), 1);
    }
}

#[test]
fn minimized_window_neither_resets_nor_accumulates() {
    let mut graph = ResourceDependencyGraph::new().expect("graph");
    let mut host = Headless {
        extent: (640, 360),
        minimized: false,
    };
    let mut accumulation = AccumulationState::default();
    frame(&mut graph, &mut host, &mut accumulation, UpdateRequest::startup());
    frame(&mut graph, &mut host, &mut accumulation, UpdateRequest::default());

    host.minimized = true;
    let resize = UpdateRequest {
        window_resize: true,
        ..UpdateRequest::default()
    };
    assert!(!frame(&mut graph, &mut host, &mut accumulation, resize));
    assert_eq!(accumulation.sample_count(), 2);

    host.minimized = false;
    assert!(frame(&mut graph, &mut host, &mut accumulation, UpdateRequest::default()));
    assert_eq!(accumulation.sample_count(), 1);
}
