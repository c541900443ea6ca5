use super::{Aabb, Ray};

pub type PointerId = u64;

/// An always-clickable foreground object that gets first refusal on pointer presses.
pub trait ForegroundPicker: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    /// Distance along the ray when the object is hit.
    fn hit(&self, ray: &Ray) -> Option<f32>;
}

/// Box-shaped foreground target (landmark, floating banner).
#[derive(Debug, Clone)]
pub struct ForegroundBox {
    name: String,
    bounds: Aabb,
    priority: i32,
}

impl ForegroundBox {
    pub fn new(name: impl Into<String>, bounds: Aabb, priority: i32) -> Self {
        Self { name: name.into(), bounds, priority }
    }
}

impl ForegroundPicker for ForegroundBox {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn hit(&self, ray: &Ray) -> Option<f32> {
        self.bounds.intersect(ray)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForegroundClaim {
    pub pointer: PointerId,
    pub name: String,
    pub distance: f32,
}

/// Decides who owns a pointer press.
///
/// Every press gets a fresh [`PointerId`]. Foreground pickers are asked first, highest
/// priority first; the first one hit consumes the press and the bulk building picker must
/// then ignore it until the pointer is released.
#[derive(Default)]
pub struct InputArbiter {
    pickers: Vec<Box<dyn ForegroundPicker>>,
    consumed: Option<PointerId>,
    next_pointer: PointerId,
}

impl InputArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, picker: Box<dyn ForegroundPicker>) {
        self.pickers.push(picker);
        self.pickers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.pickers.len();
        self.pickers.retain(|p| p.name() != name);
        before != self.pickers.len()
    }

    pub fn foreground_count(&self) -> usize {
        self.pickers.len()
    }

    pub fn begin_press(&mut self) -> PointerId {
        self.next_pointer = self.next_pointer.wrapping_add(1);
        self.consumed = None;
        self.next_pointer
    }

    /// Capture phase: runs before the bulk picker sees the press.
    pub fn capture(&mut self, pointer: PointerId, ray: Option<&Ray>) -> Option<ForegroundClaim> {
        let ray = ray?;
        for picker in &self.pickers {
            if let Some(distance) = picker.hit(ray) {
                self.consumed = Some(pointer);
                return Some(ForegroundClaim { pointer, name: picker.name().to_string(), distance });
            }
        }
        None
    }

    pub fn consume(&mut self, pointer: PointerId) {
        self.consumed = Some(pointer);
    }

    pub fn is_consumed(&self, pointer: PointerId) -> bool {
        self.consumed == Some(pointer)
    }

    pub fn release(&mut self, pointer: PointerId) {
        if self.consumed == Some(pointer) {
            self.consumed = None;
        }
    }
}
