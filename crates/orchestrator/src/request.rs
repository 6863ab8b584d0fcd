/// Everything that changed since the last frame and may require resources to
/// be rebuilt. Built fresh each frame from input, UI and the experiment
/// engine, then consumed once by [`crate::ResourceDependencyGraph::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub startup: bool,
    pub window_resize: bool,
    pub reload_shaders: bool,
    pub light_count_changed: bool,
    pub light_texture_changed: bool,
    pub scene_reload: bool,
    pub shading_changed: bool,
    pub quick_save: bool,
    pub quick_load: bool,
    /// Desired drawable size. Only acted upon if it differs from the current
    /// surface extent.
    pub requested_size: Option<(u32, u32)>,
}

impl UpdateRequest {
    pub fn startup() -> Self {
        Self {
            startup: true,
            ..Self::default()
        }
    }

    /// True if no flag is set and no size is requested.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True if any flag that seeds a rebuild is set.
    pub fn seeds_rebuild(&self) -> bool {
        self.startup
            || self.window_resize
            || self.reload_shaders
            || self.light_count_changed
            || self.light_texture_changed
            || self.scene_reload
            || self.shading_changed
    }

    /// Folds another request into this one. Flags are OR-ed; a size request
    /// in `other` wins.
    pub fn merge(&mut self, other: UpdateRequest) {
        self.startup |= other.startup;
        self.window_resize |= other.window_resize;
        self.reload_shaders |= other.reload_shaders;
        self.light_count_changed |= other.light_count_changed;
        self.light_texture_changed |= other.light_texture_changed;
        self.scene_reload |= other.scene_reload;
        self.shading_changed |= other.shading_changed;
        self.quick_save |= other.quick_save;
        self.quick_load |= other.quick_load;
        if other.requested_size.is_some() {
            self.requested_size = other.requested_size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_request_is_empty() {
        assert!(UpdateRequest::default().is_empty());
        assert!(!UpdateRequest::startup().is_empty());
    }

    #[test]
    fn size_request_alone_is_not_empty_but_seeds_nothing() {
        let request = UpdateRequest {
            requested_size: Some((640, 480)),
            ..UpdateRequest::default()
        };
        assert!(!request.is_empty());
        assert!(!request.seeds_rebuild());
    }

    #[test]
    fn merge_ors_flags() {
        let mut request = UpdateRequest {
            quick_save: true,
            ..UpdateRequest::default()
        };
        request.merge(UpdateRequest {
            reload_shaders: true,
            requested_size: Some((800, 600)),
            ..UpdateRequest::default()
        });
        assert!(request.quick_save);
        assert!(request.reload_shaders);
        assert_eq!(request.requested_size, Some((800, 600)));
    }
}
