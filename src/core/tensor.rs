use std::sync::Arc;

use parking_lot::Mutex;
use tch::{kind::Element, Tensor};

/// A shared, lockable tensor. Every parameter of a module lives in one.
pub type TensorCell = Arc<Mutex<Tensor>>;

pub trait Cellable {
    fn cell(self) -> TensorCell;
}

impl Cellable for Tensor {
    fn cell(self) -> TensorCell {
        Arc::new(Mutex::new(self))
    }
}

/// Create a [`Vec<Arc<Tensor>>`] from nested arrays, one tensor per argument.
#[macro_export]
macro_rules! tensor_vec {
    ($($x:expr),* $(,)?) => {
        {
            vec![$(std::sync::Arc::new($crate::tensor!($x)),)*]
        }
    };
}

/// Decide if two tensors are equal.
///
/// Defaultly, the tensors are considered equal if they have the same shape and values whose MLE is less than 1e-6.
///
/// You can also explicitly specify the tolerance by passing a third argument.
#[macro_export]
macro_rules! tensor_eq {
    ($a:expr, $b:expr) => {{
        $crate::tensor_eq!($a, $b, 1e-6)
    }};
    ($a:expr, $b:expr, $c:expr) => {{
        match (&$a, &$b) {
            (a, b) => {
                let a: &tch::Tensor = a;
                let b: &tch::Tensor = b;
                a.size() == b.size()
                    && f64::try_from((a - b).square().sum(tch::Kind::Double))
                        .unwrap_or(f64::INFINITY)
                        < $c
            }
        }
    }};
}

/// Assert if two tensors are equal.
///
/// Defaultly, the tensors are considered equal if they have the same shape and values whose MLE is less than 1e-6.
///
/// You can also explicitly specify the tolerance by passing a third argument.
#[macro_export]
macro_rules! assert_tensor_eq {
    ($a:expr, $b:expr) => {
        assert!($crate::tensor_eq!($a, $b), "tensors differ");
    };
    ($a:expr, $b:expr, $c:expr) => {
        assert!($crate::tensor_eq!($a, $b, $c), "tensors differ");
    };
}

/// A nested fixed-size array of tensor elements, viewed as shape plus flat data.
pub trait ElementNestedArray<T: Element> {
    fn shape(&self) -> Vec<i64>;
    fn flat(&self) -> &[T];
}

impl<T: Element, const N1: usize> ElementNestedArray<T> for [T; N1] {
    fn shape(&self) -> Vec<i64> {
        vec![N1 as i64]
    }

    fn flat(&self) -> &[T] {
        self
    }
}

impl<T: Element, const N1: usize, const N2: usize> ElementNestedArray<T> for [[T; N2]; N1] {
    fn shape(&self) -> Vec<i64> {
        vec![N1 as i64, N2 as i64]
    }

    fn flat(&self) -> &[T] {
        self.as_flattened()
    }
}

impl<T: Element, const N1: usize, const N2: usize, const N3: usize> ElementNestedArray<T>
    for [[[T; N3]; N2]; N1]
{
    fn shape(&self) -> Vec<i64> {
        vec![N1 as i64, N2 as i64, N3 as i64]
    }

    fn flat(&self) -> &[T] {
        self.as_flattened().as_flattened()
    }
}

impl<T: Element, const N1: usize, const N2: usize, const N3: usize, const N4: usize>
    ElementNestedArray<T> for [[[[T; N4]; N3]; N2]; N1]
{
    fn shape(&self) -> Vec<i64> {
        vec![N1 as i64, N2 as i64, N3 as i64, N4 as i64]
    }

    fn flat(&self) -> &[T] {
        self.as_flattened().as_flattened().as_flattened()
    }
}

/// Convert a multi-dimensional array to tensor
#[macro_export]
macro_rules! tensor {
    ($a:expr) => {{
        use $crate::core::ElementNestedArray;
        let data = $a;
        let shape = data.shape();
        let flattened_array = data.flat();
        tch::Tensor::from_slice(flattened_array).view(shape.as_slice())
    }};
}
