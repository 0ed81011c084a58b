//! Renderer lifecycle bookkeeping, kept free of GPU handles so it can be
//! checked without a device.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RendererState {
    Uninitialized,
    /// Pipeline and buffers exist.
    Ready,
    /// A Gaussian set has been uploaded at least once.
    GaussianDataBound,
    /// Data, a matching order and both camera blocks are in place.
    Drawable,
}

/// What has reached the GPU since the current Gaussian set was bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReadiness {
    pub initialized: bool,
    /// Count of the bound Gaussian set, once one has been uploaded.
    pub gaussians: Option<u32>,
    /// Length of the last uploaded order.
    pub order: Option<u32>,
    pub pose: bool,
    pub intrinsics: bool,
}

impl FrameReadiness {
    pub fn ready() -> Self {
        Self {
            initialized: true,
            ..Self::default()
        }
    }

    /// Records a new set; any previous order no longer indexes it.
    pub fn bind_gaussians(&mut self, count: u32) {
        self.gaussians = Some(count);
        self.order = None;
    }

    pub fn bind_order(&mut self, count: u32) {
        self.order = Some(count);
    }

    pub fn state(&self) -> RendererState {
        match (self.initialized, self.gaussians) {
            (false, _) => RendererState::Uninitialized,
            (true, None) => RendererState::Ready,
            (true, Some(n)) => {
                if self.order == Some(n) && self.pose && self.intrinsics {
                    RendererState::Drawable
                } else {
                    RendererState::GaussianDataBound
                }
            }
        }
    }

    #[inline]
    pub fn is_drawable(&self) -> bool {
        self.state() == RendererState::Drawable
    }

    /// Instance count for the next draw; zero unless drawable.
    pub fn instance_count(&self) -> u32 {
        if self.is_drawable() {
            self.gaussians.unwrap_or(0)
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut r = FrameReadiness::default();
        assert_eq!(r.state(), RendererState::Uninitialized);

        r = FrameReadiness::ready();
        assert_eq!(r.state(), RendererState::Ready);

        r.bind_gaussians(4);
        assert_eq!(r.state(), RendererState::GaussianDataBound);
        r.bind_order(4);
        r.pose = true;
        assert_eq!(r.state(), RendererState::GaussianDataBound);
        r.intrinsics = true;
        assert_eq!(r.state(), RendererState::Drawable);
        assert_eq!(r.instance_count(), 4);
    }

    #[test]
    fn rebinding_requires_a_fresh_order() {
        let mut r = FrameReadiness::ready();
        r.pose = true;
        r.intrinsics = true;
        r.bind_gaussians(4);
        r.bind_order(4);
        assert!(r.is_drawable());

        r.bind_gaussians(10);
        assert!(!r.is_drawable());
        assert_eq!(r.instance_count(), 0);

        r.bind_order(4);
        assert!(!r.is_drawable());
        r.bind_order(10);
        assert_eq!(r.instance_count(), 10);
    }

    #[test]
    fn empty_set_is_drawable_with_no_instances() {
        let mut r = FrameReadiness::ready();
        r.pose = true;
        r.intrinsics = true;
        r.bind_gaussians(0);
        r.bind_order(0);
        assert!(r.is_drawable());
        assert_eq!(r.instance_count(), 0);
    }
}
