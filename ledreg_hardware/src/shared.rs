use std::cell::RefCell;
use std::rc::Rc;

use ledreg_traits::{BoxError, I2cBus};

/// One bus shared by several drivers on the same control thread.
pub struct SharedBus<B> {
    inner: Rc<RefCell<B>>,
}

impl<B> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<B> SharedBus<B> {
    pub fn new(bus: B) -> Self {
        Self {
            inner: Rc::new(RefCell::new(bus)),
        }
    }

    /// Run `f` with exclusive access to the underlying bus.
    pub fn with<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }
}

impl<B: I2cBus> I2cBus for SharedBus<B> {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BoxError> {
        self.inner.borrow_mut().write(address, bytes)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BoxError> {
        self.inner.borrow_mut().read(address, buf)
    }

    fn write_read(&mut self, address: u8, bytes: &[u8], buf: &mut [u8]) -> Result<(), BoxError> {
        self.inner.borrow_mut().write_read(address, bytes, buf)
    }
}
