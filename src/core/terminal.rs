//! Terminal trait.

/// Minimal output surface the stream renderer draws on.
pub trait Terminal {
    /// Write output to the terminal.
    fn write(&mut self, data: &str);

    /// Push buffered output to the device, if the terminal buffers.
    fn flush(&mut self) {}

    /// Terminal dimensions.
    fn columns(&self) -> u16;
    fn rows(&self) -> u16;
}

impl<T: Terminal + ?Sized> Terminal for Box<T> {
    fn write(&mut self, data: &str) {
        (**self).write(data);
    }

    fn flush(&mut self) {
        (**self).flush();
    }

    fn columns(&self) -> u16 {
        (**self).columns()
    }

    fn rows(&self) -> u16 {
        (**self).rows()
    }
}
