use std::ops::{Index, IndexMut};

/// Dense 3-D buffer stored in (z, y, x) order, x varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer3<T> {
    data: Vec<T>,
    depth: usize,
    height: usize,
    width: usize,
}

impl<T> Buffer3<T> {
    pub fn new(depth: usize, height: usize, width: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            depth * height * width,
            "data length must equal depth * height * width"
        );
        Self {
            data,
            depth,
            height,
            width,
        }
    }

    #[inline]
    pub fn index_of(&self, z: usize, y: usize, x: usize) -> usize {
        debug_assert!(z < self.depth && y < self.height && x < self.width);
        (z * self.height + y) * self.width + x
    }

    /// Inverse of [`Buffer3::index_of`].
    #[inline]
    pub fn coords_of(&self, index: usize) -> (usize, usize, usize) {
        let plane = self.plane_len();
        let z = index / plane;
        let rest = index % plane;
        (z, rest / self.width, rest % self.width)
    }

    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> &T {
        &self.data[self.index_of(z, y, x)]
    }

    #[inline]
    pub fn get_mut(&mut self, z: usize, y: usize, x: usize) -> &mut T {
        let index = self.index_of(z, y, x);
        &mut self.data[index]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Shape as `(depth, height, width)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.depth, self.height, self.width)
    }

    /// Number of elements in one z plane.
    #[inline]
    pub fn plane_len(&self) -> usize {
        self.height * self.width
    }

    #[inline]
    pub fn plane(&self, z: usize) -> &[T] {
        let len = self.plane_len();
        &self.data[z * len..(z + 1) * len]
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Buffer3<U> {
        Buffer3 {
            data: self.data.iter().map(f).collect(),
            depth: self.depth,
            height: self.height,
            width: self.width,
        }
    }
}

impl<T: Clone> Buffer3<T> {
    pub fn new_filled(depth: usize, height: usize, width: usize, value: T) -> Self {
        Self::new(depth, height, width, vec![value; depth * height * width])
    }
}

impl<T: Default + Clone> Buffer3<T> {
    pub fn new_default(depth: usize, height: usize, width: usize) -> Self {
        Self::new_filled(depth, height, width, T::default())
    }
}

impl<T> Index<(usize, usize, usize)> for Buffer3<T> {
    type Output = T;

    #[inline]
    fn index(&self, (z, y, x): (usize, usize, usize)) -> &Self::Output {
        self.get(z, y, x)
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Buffer3<T> {
    #[inline]
    fn index_mut(&mut self, (z, y, x): (usize, usize, usize)) -> &mut Self::Output {
        self.get_mut(z, y, x)
    }
}
