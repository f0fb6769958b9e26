use crate::glam::{DVec2, IVec2};

/// An axis-aligned rectangle on the integer XZ plane.
///
/// The rectangle covers `minimum` inclusive up to `least_upper_bound()` exclusive, so two rectangles that only share an edge
/// do not intersect.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Rect {
    pub minimum: IVec2,
    pub shape: IVec2,
}

impl Rect {
    pub const fn from_min_and_shape(minimum: IVec2, shape: IVec2) -> Self {
        Self { minimum, shape }
    }

    pub fn from_min_and_lub(minimum: IVec2, least_upper_bound: IVec2) -> Self {
        Self {
            minimum,
            shape: (least_upper_bound - minimum).max(IVec2::ZERO),
        }
    }

    /// A square with edge `size` whose minimum corner is `minimum`.
    pub fn square(minimum: IVec2, size: i32) -> Self {
        Self::from_min_and_shape(minimum, IVec2::splat(size))
    }

    #[inline]
    pub fn least_upper_bound(&self) -> IVec2 {
        self.minimum + self.shape
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shape.x <= 0 || self.shape.y <= 0
    }

    pub fn center(&self) -> DVec2 {
        self.minimum.as_dvec2() + self.shape.as_dvec2() / 2.0
    }

    #[inline]
    pub fn contains(&self, p: IVec2) -> bool {
        let lub = self.least_upper_bound();
        p.cmpge(self.minimum).all() && p.cmplt(lub).all()
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let minimum = self.minimum.max(other.minimum);
        let lub = self.least_upper_bound().min(other.least_upper_bound());
        Self::from_min_and_lub(minimum, lub)
    }

    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersection(other).is_empty()
    }

    /// The smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let minimum = self.minimum.min(other.minimum);
        let lub = self.least_upper_bound().max(other.least_upper_bound());
        Self::from_min_and_lub(minimum, lub)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn touching_rects_do_not_intersect() {
        let a = Rect::square(IVec2::ZERO, 16);
        let b = Rect::square(IVec2::new(16, 0), 16);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&Rect::square(IVec2::new(15, 15), 16)));
    }

    #[test]
    fn union_covers_both() {
        let a = Rect::square(IVec2::new(-32, -32), 32);
        let b = Rect::square(IVec2::new(32, 0), 32);
        let u = a.union(&b);
        assert_eq!(u.minimum, IVec2::new(-32, -32));
        assert_eq!(u.least_upper_bound(), IVec2::new(64, 32));
        assert_eq!(a.union(&Rect::square(IVec2::ZERO, 0)), a);
    }

    #[test]
    fn contains_is_half_open() {
        let r = Rect::square(IVec2::new(-4, -4), 8);
        assert!(r.contains(IVec2::new(-4, -4)));
        assert!(r.contains(IVec2::new(3, 3)));
        assert!(!r.contains(IVec2::new(4, 0)));
    }

    #[test]
    fn center_of_odd_rect() {
        let r = Rect::from_min_and_shape(IVec2::new(1, 2), IVec2::new(3, 5));
        let c = r.center();
        assert_relative_eq!(c.x, 2.5);
        assert_relative_eq!(c.y, 4.5);
    }
}
