//! Contains utility functions for waiting on hardware flags


/// Blocks on a non-blocking operation until a timer times out
///
/// Expects two arguments: A timer that implements
/// `embedded_hal::timer::CountDown` and has already been started, and an
/// expression that evaluates to `nb::Result<T, E>`. Returns
/// `Result<T, TimeoutError<E>>`.
///
/// The operation is always evaluated at least once before the timer is
/// checked, so a flag that is already set is never reported as a timeout.
macro_rules! block_timeout {
    ($timer:expr, $op:expr) => {
        {
            // Make sure the timer has the right type. If it isn't, the user
            // should at least get a good error message.
            fn check_type<T>(_: &mut T)
                where T: embedded_hal::timer::CountDown {}
            check_type($timer);

            loop {
                match $op {
                    Ok(result) =>
                        break Ok(result),
                    Err(nb::Error::WouldBlock) =>
                        (),
                    Err(nb::Error::Other(error)) =>
                        break Err($crate::util::TimeoutError::Other(error)),
                }

                match embedded_hal::timer::CountDown::wait($timer) {
                    Ok(()) =>
                        break Err($crate::util::TimeoutError::Timeout),
                    Err(nb::Error::WouldBlock) =>
                        (),
                    Err(nb::Error::Other(void)) =>
                        match void {},
                }
            }
        }
    }
}


/// Turns a hardware flag into a pollable operation
///
/// Returns `Ok(())` once `flag` is set, `WouldBlock` otherwise.
pub fn poll_flag(flag: bool) -> nb::Result<(), core::convert::Infallible> {
    if flag {
        Ok(())
    }
    else {
        Err(nb::Error::WouldBlock)
    }
}


/// An error that can be a timeout or another error
#[derive(Debug)]
pub enum TimeoutError<T> {
    /// The operation timed out
    Timeout,

    /// Another error occured
    Other(T),
}
