use std::cell::{Ref, RefCell};
use std::cmp::PartialEq;
use std::rc::Rc;

use crate::error::{HarnessError, Result};

use super::numeric::*;
use super::types::Shape;

/// The storage behind a [`Param`].
///
/// Data and gradient sit behind `RefCell`s so a parameter can be updated
/// through a shared handle, which is how the traversal hands leaves out.
#[derive(Debug)]
pub struct RawParam<T>
where
    T: Numeric,
{
    pub(in crate::tensor) array: RefCell<Vec<T>>,
    pub(in crate::tensor) shape: Shape,
    pub(in crate::tensor) grad: RefCell<Option<Vec<T>>>,
    pub(in crate::tensor) requires_grad: bool,
}

impl<T: Numeric> PartialEq for RawParam<T> {
    // Gradients are bookkeeping, two params holding the same values are equal.
    fn eq(&self, other: &Self) -> bool {
        if self.shape != other.shape {
            return false;
        }
        *self.array.borrow() == *other.array.borrow()
    }
}

/// A shared handle to a trainable parameter.
///
/// Cloning a `Param` clones the handle, not the data. Use [`Param::deep_clone`]
/// to copy the values.
#[derive(Debug, PartialEq, Clone)]
pub struct Param<T: Numeric>(pub(in crate::tensor) Rc<RawParam<T>>);

impl<T: Numeric> Param<T> {
    pub(in crate::tensor) fn from_raw(raw: RawParam<T>) -> Param<T> {
        Param(Rc::new(raw))
    }

    /// # Panics
    /// Panics if `array.len()` does not match the product of `shape`.
    pub fn new(array: Vec<T>, shape: Shape) -> Param<T> {
        let len: usize = shape.iter().product();
        assert_eq!(
            len,
            array.len(),
            "shape {:?} is incompatible with {} elements",
            shape,
            array.len()
        );
        Param::from_raw(RawParam {
            array: RefCell::new(array),
            shape,
            grad: RefCell::new(None),
            requires_grad: true,
        })
    }

    /// Note! An empty shape constructs a scalar.
    pub fn new_with_filler(shape: Shape, filler: T) -> Param<T> {
        let total = shape.iter().product();
        Param::new(vec![filler; total], shape)
    }

    pub fn scalar(scalar: T) -> Param<T> {
        Param::new(vec![scalar], vec![])
    }

    /// A parameter excluded from gradient updates.
    pub fn frozen(array: Vec<T>, shape: Vec<usize>) -> Param<T> {
        Param::new(array, shape).with_requires_grad(false)
    }

    pub fn with_requires_grad(self, requires_grad: bool) -> Param<T> {
        let raw = match Rc::try_unwrap(self.0) {
            Ok(raw) => raw,
            Err(shared) => RawParam {
                array: RefCell::new(shared.array.borrow().clone()),
                shape: shared.shape.clone(),
                grad: RefCell::new(shared.grad.borrow().clone()),
                requires_grad: shared.requires_grad,
            },
        };
        Param::from_raw(RawParam {
            requires_grad,
            ..raw
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.0.shape
    }

    pub fn numel(&self) -> usize {
        self.0.shape.iter().product()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.shape.is_empty()
    }

    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    pub fn data(&self) -> Ref<'_, Vec<T>> {
        self.0.array.borrow()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.0.array.borrow().clone()
    }

    /// # Panics
    /// Panics if this is not a scalar.
    pub fn elem(&self) -> T {
        assert!(self.is_scalar(), "elem() called on shape {:?}", self.shape());
        self.0.array.borrow()[0]
    }

    /// Do both handles point at the same storage?
    pub fn ptr_eq(&self, other: &Param<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Copy the values into fresh storage, without the gradient.
    pub fn deep_clone(&self) -> Param<T> {
        Param::from_raw(RawParam {
            array: RefCell::new(self.to_vec()),
            shape: self.0.shape.clone(),
            grad: RefCell::new(None),
            requires_grad: self.0.requires_grad,
        })
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.numel() {
            return Err(HarnessError::ShapeMismatch {
                expected: self.0.shape.clone(),
                found: vec![len],
            });
        }
        Ok(())
    }

    /// Replace the values in place. Every handle observes the new values.
    pub fn update(&self, array: Vec<T>) -> Result<()> {
        self.check_len(array.len())?;
        *self.0.array.borrow_mut() = array;
        Ok(())
    }

    /// `self -= scale * delta`, element-wise and in place.
    pub fn sub_scaled(&self, delta: &[T], scale: T) -> Result<()> {
        self.check_len(delta.len())?;
        for (w, &d) in self.0.array.borrow_mut().iter_mut().zip(delta) {
            *w -= scale * d;
        }
        Ok(())
    }

    pub fn grad(&self) -> Option<Vec<T>> {
        self.0.grad.borrow().clone()
    }

    pub fn has_grad(&self) -> bool {
        self.0.grad.borrow().is_some()
    }

    pub fn set_grad(&self, grad: Vec<T>) -> Result<()> {
        self.check_len(grad.len())?;
        *self.0.grad.borrow_mut() = Some(grad);
        Ok(())
    }

    /// Add `grad` onto the stored gradient, starting from zero if there is none.
    pub fn accumulate_grad(&self, grad: &[T]) -> Result<()> {
        self.check_len(grad.len())?;
        let mut slot = self.0.grad.borrow_mut();
        match slot.as_mut() {
            Some(existing) => existing
                .iter_mut()
                .zip(grad)
                .for_each(|(acc, &g)| *acc += g),
            None => *slot = Some(grad.to_vec()),
        }
        Ok(())
    }

    /// Drop the stored gradient.
    pub fn zero_grad(&self) {
        self.0.grad.borrow_mut().take();
    }

    pub(crate) fn take_grad(&self) -> Option<Vec<T>> {
        self.0.grad.borrow_mut().take()
    }
}

#[test]
fn test_new_with_filler() {
    let param = Param::new_with_filler(vec![4], 4);
    assert_eq!(param.shape(), &[4]);
    assert_eq!(param.to_vec(), vec![4, 4, 4, 4]);
}

#[test]
fn test_scalar_from_empty_shape() {
    let param = Param::new_with_filler(vec![], 3.0);
    assert!(param.is_scalar());
    assert_eq!(param.elem(), 3.0);
}

#[test]
#[should_panic]
fn test_new_rejects_bad_shape() {
    Param::new(vec![1.0, 2.0, 3.0], vec![2, 2]);
}

#[test]
fn test_clone_shares_storage() {
    let a = Param::new(vec![1.0, 2.0], vec![2]);
    let b = a.clone();
    b.update(vec![5.0, 6.0]).unwrap();
    assert_eq!(a.to_vec(), vec![5.0, 6.0]);
    assert!(a.ptr_eq(&b));

    let c = a.deep_clone();
    c.update(vec![0.0, 0.0]).unwrap();
    assert_eq!(a.to_vec(), vec![5.0, 6.0]);
    assert!(!a.ptr_eq(&c));
}

#[test]
fn test_grad_lifecycle() {
    let p = Param::new(vec![1.0, 1.0], vec![1, 2]);
    assert!(!p.has_grad());
    p.accumulate_grad(&[0.5, 1.0]).unwrap();
    p.accumulate_grad(&[0.5, 1.0]).unwrap();
    assert_eq!(p.grad(), Some(vec![1.0, 2.0]));
    assert!(matches!(
        p.set_grad(vec![1.0]),
        Err(HarnessError::ShapeMismatch { .. })
    ));
    p.zero_grad();
    assert_eq!(p.grad(), None);
}

#[test]
fn test_sub_scaled() {
    let p = Param::new(vec![1.0, 2.0], vec![2]);
    p.sub_scaled(&[1.0, 1.0], 0.5).unwrap();
    assert_eq!(p.to_vec(), vec![0.5, 1.5]);
}

#[test]
fn test_with_requires_grad_keeps_values() {
    let p = Param::new(vec![1, 2], vec![2]);
    let alias = p.clone();
    let frozen = p.with_requires_grad(false);
    assert!(!frozen.requires_grad());
    assert!(alias.requires_grad());
    assert_eq!(frozen, alias);
}
