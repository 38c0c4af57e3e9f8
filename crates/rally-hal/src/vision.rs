//! Single-shot vision classifier.
//!
//! Each call looks at the newest camera frame once.  Results are noisy; the
//! mission draws repeatedly through the confidence sampler rather than
//! trusting one frame.

use rally_types::{Shape, ShapeMask};

/// Camera-backed classifier of the course objects.
pub trait Vision: Send {
    /// Shape of the dominant blob in the given colour mask, or
    /// [`Shape::Unknown`] when the frame holds no single recognisable shape.
    fn classify_shape(&mut self, mask: ShapeMask) -> Shape;

    /// Number of sufficiently large red or green objects in view.
    fn count_objects(&mut self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Shape);

    impl Vision for Fixed {
        fn classify_shape(&mut self, mask: ShapeMask) -> Shape {
            match mask {
                ShapeMask::Green => self.0,
                ShapeMask::Red => Shape::Unknown,
            }
        }

        fn count_objects(&mut self) -> u32 {
            2
        }
    }

    #[test]
    fn classifier_is_object_safe() {
        let mut vision: Box<dyn Vision> = Box::new(Fixed(Shape::Triangle));
        assert_eq!(vision.classify_shape(ShapeMask::Green), Shape::Triangle);
        assert_eq!(vision.classify_shape(ShapeMask::Red), Shape::Unknown);
        assert_eq!(vision.count_objects(), 2);
    }
}
