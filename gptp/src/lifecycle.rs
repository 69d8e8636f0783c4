//! Ordered bring-up and teardown of collaborators
//!
//! [`start_all`] starts a list of [`Lifecycle`] items in order. When one of
//! them fails, the items started before it are stopped again in reverse
//! order, so a failed start leaves nothing running.

/// Something that is started once and stopped once
///
/// `Ctx` is handed to both calls. It holds whatever the items need to
/// acquire and release their resources.
pub trait Lifecycle<Ctx: ?Sized> {
    /// Reason starting failed
    type Error;

    /// Acquire resources and start running
    fn start(&mut self, context: &mut Ctx) -> Result<(), Self::Error>;

    /// Undo a successful [`start`](Lifecycle::start)
    fn stop(&mut self, context: &mut Ctx);
}

/// Start all items in order.
///
/// On failure of the item at index `n`, items `n-1` down to `0` are stopped
/// and the error is returned together with `n`. Items after `n` are never
/// touched.
pub fn start_all<Ctx: ?Sized, L: Lifecycle<Ctx>>(
    items: &mut [L],
    context: &mut Ctx,
) -> Result<(), (usize, L::Error)> {
    for index in 0..items.len() {
        if let Err(error) = items[index].start(context) {
            for started in items[..index].iter_mut().rev() {
                started.stop(context);
            }
            return Err((index, error));
        }
    }

    Ok(())
}

/// Stop all items in reverse order
pub fn stop_all<Ctx: ?Sized, L: Lifecycle<Ctx>>(items: &mut [L], context: &mut Ctx) {
    for item in items.iter_mut().rev() {
        item.stop(context);
    }
}
