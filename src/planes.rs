//! Contains the PlaneMapper struct, which describes a relationship
//! between a grid of cells with an origin at 0,0 and a viewport on
//! the complex plane, along with the escape-time kernel evaluated at
//! every cell.
use num::Complex;

use errors::ConfigError;
use tasks::Shape;

/// Describes the x, y of a cell in the grid: the column first, then
/// the row.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pixel(pub usize, pub usize);

/// The rectangle of the complex plane being rendered: the lower-left
/// corner and the extent along each axis.  The real part is the
/// x-component, the imaginary part the y-component.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    /// Leftmost real value.
    pub xmin: f64,
    /// Lowest imaginary value.
    pub ymin: f64,
    /// Width along the real axis.
    pub dx: f64,
    /// Height along the imaginary axis.
    pub dy: f64,
}

impl Default for Viewport {
    fn default() -> Viewport {
        Viewport {
            xmin: -2.5,
            ymin: -1.0,
            dx: 3.5,
            dy: 2.0,
        }
    }
}

impl Viewport {
    /// Rightmost real value.
    pub fn xmax(&self) -> f64 {
        self.xmin + self.dx
    }

    /// Highest imaginary value.
    pub fn ymax(&self) -> f64 {
        self.ymin + self.dy
    }

    /// A viewport must have a positive extent along both axes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dx > 0.0) || !(self.dy > 0.0) {
            return Err(ConfigError::EmptyViewport {
                dx: self.dx,
                dy: self.dy,
            });
        }
        Ok(())
    }
}

/// Maps cells of the integral grid onto the complex viewport.  The
/// first column lands on `xmin` and the last on `xmax`; likewise the
/// first and last rows land on `ymin` and `ymax`.
#[derive(Copy, Clone, Debug)]
pub struct PlaneMapper {
    /// Dimensions of the integral grid.
    pub shape: Shape,
    /// The region of the complex plane the grid covers.
    pub viewport: Viewport,
}

impl PlaneMapper {
    /// Constructor.  Rejects grids with fewer than two rows or columns,
    /// and viewports without area.
    pub fn new(shape: Shape, viewport: Viewport) -> Result<PlaneMapper, ConfigError> {
        if shape.rows < 2 || shape.cols < 2 {
            return Err(ConfigError::GridTooSmall {
                rows: shape.rows,
                cols: shape.cols,
            });
        }
        viewport.validate()?;
        Ok(PlaneMapper { shape, viewport })
    }

    /// The total number of cells in the grid.
    pub fn len(&self) -> usize {
        self.shape.len()
    }

    /// Describes that the grid is of a size.
    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }

    /// Given a cell of the grid, return the complex number it stands
    /// for.
    pub fn pixel_to_point(&self, pixel: &Pixel) -> Complex<f64> {
        // Divide, then scale, then offset.  Keep this order: the other
        // renderers compare against these values bit for bit.
        Complex::new(
            (pixel.0 as f64) / ((self.shape.cols - 1) as f64) * self.viewport.dx
                + self.viewport.xmin,
            (pixel.1 as f64) / ((self.shape.rows - 1) as f64) * self.viewport.dy
                + self.viewport.ymin,
        )
    }

    /// The escape-time kernel for one cell of the grid.
    #[inline]
    pub fn evaluate(&self, pixel: &Pixel, max_iterations: u32) -> u32 {
        escape_time(self.pixel_to_point(pixel), max_iterations)
    }
}

/// Iterates `z = z² + c` from zero and returns how many iterations it
/// took for `|z|²` to reach 4, or `max_iterations` if it never did.
#[inline]
pub fn escape_time(c: Complex<f64>, max_iterations: u32) -> u32 {
    let mut z: Complex<f64> = Complex { re: 0.0, im: 0.0 };
    let mut iterations = 0;
    while z.norm_sqr() < 4.0 && iterations < max_iterations {
        z = z * z + c;
        iterations += 1;
    }
    iterations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(cols: usize, rows: usize) -> PlaneMapper {
        PlaneMapper::new(Shape::new(rows, cols), Viewport::default()).unwrap()
    }

    #[test]
    fn planemapper_fails_on_small_grid() {
        let pm = PlaneMapper::new(Shape::new(1, 4), Viewport::default());
        assert_eq!(pm.unwrap_err(), ConfigError::GridTooSmall { rows: 1, cols: 4 });
    }

    #[test]
    fn planemapper_fails_on_bad_viewport() {
        let viewport = Viewport {
            dx: 0.0,
            ..Viewport::default()
        };
        assert!(PlaneMapper::new(Shape::new(4, 4), viewport).is_err());
        let viewport = Viewport {
            dy: -1.0,
            ..Viewport::default()
        };
        assert!(PlaneMapper::new(Shape::new(4, 4), viewport).is_err());
    }

    #[test]
    fn default_viewport_spans_classic_window() {
        let v = Viewport::default();
        assert_eq!(v.xmax(), 1.0);
        assert_eq!(v.ymax(), 1.0);
    }

    #[test]
    fn pixel_to_point_hits_the_corners() {
        let pm = plane(8, 3);
        assert_eq!(pm.pixel_to_point(&Pixel(0, 0)), Complex::new(-2.5, -1.0));
        assert_eq!(pm.pixel_to_point(&Pixel(7, 2)), Complex::new(1.0, 1.0));
    }

    #[test]
    fn pixel_to_point_finds_the_origin() {
        let pm = plane(8, 3);
        assert_eq!(pm.pixel_to_point(&Pixel(5, 1)), Complex::new(0.0, 0.0));
    }

    #[test]
    fn origin_never_escapes() {
        let pm = plane(8, 3);
        assert_eq!(pm.evaluate(&Pixel(5, 1), 100), 100);
        assert_eq!(escape_time(Complex::new(0.0, 0.0), 100), 100);
    }

    #[test]
    fn far_point_escapes_immediately() {
        let n = escape_time(Complex::new(2.0, 2.0), 100);
        assert!(n <= 2, "escaped after {} iterations", n);
    }

    #[test]
    fn zero_iterations_is_zero() {
        assert_eq!(escape_time(Complex::new(0.0, 0.0), 0), 0);
    }
}
