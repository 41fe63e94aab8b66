use crate::ErrorDelivery;
use std::{error, fmt, sync::Arc};
use wgt::ErrorFilter;

/// Error type reported through error scopes and the uncaptured error handler.
#[derive(Debug)]
pub enum Error {
    /// Out of memory error
    OutOfMemory {
        /// Lower level source of the error.
        source: Box<dyn error::Error + Send + Sync + 'static>,
    },
    /// Validation error, signifying a bug in code or data
    Validation {
        /// Lower level source of the error.
        source: Box<dyn error::Error + Send + Sync + 'static>,
        /// Description of the validation error.
        description: String,
    },
}

impl Error {
    /// Returns the error scope filter that captures this error.
    pub fn filter(&self) -> ErrorFilter {
        match *self {
            Self::OutOfMemory { .. } => ErrorFilter::OutOfMemory,
            Self::Validation { .. } => ErrorFilter::Validation,
        }
    }

    pub(crate) fn from_class<E: ErrorClass>(cause: E, operation: &'static str, label: &str) -> Self {
        let filter = cause.filter();
        let context = ContextError {
            operation,
            label: label.to_string(),
            cause: Box::new(cause),
        };
        match filter {
            ErrorFilter::OutOfMemory => Self::OutOfMemory {
                source: Box::new(context),
            },
            ErrorFilter::Validation => Self::Validation {
                description: format_error(&context),
                source: Box::new(context),
            },
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::OutOfMemory { .. } => f.write_str("Out of Memory"),
            Self::Validation { ref description, .. } => f.write_str(description),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Self::OutOfMemory { ref source } => Some(source.as_ref()),
            Self::Validation { ref source, .. } => Some(source.as_ref()),
        }
    }
}

/// Failure of an operation to reach the device.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("Not enough memory left")]
    OutOfMemory,
    #[error("Parent device is lost")]
    Lost,
}

/// Classification of internal errors into the scope filters.
///
/// Everything is a validation error unless it carries an allocation failure.
pub(crate) trait ErrorClass: error::Error + Send + Sync + 'static {
    fn filter(&self) -> ErrorFilter {
        ErrorFilter::Validation
    }
}

impl ErrorClass for DeviceError {
    fn filter(&self) -> ErrorFilter {
        match *self {
            Self::OutOfMemory => ErrorFilter::OutOfMemory,
            Self::Lost => ErrorFilter::Validation,
        }
    }
}

/// Implements [`ErrorClass`] for enums with a `Device(DeviceError)` variant.
macro_rules! device_error_class {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::error::ErrorClass for $ty {
            fn filter(&self) -> wgt::ErrorFilter {
                match *self {
                    Self::Device(ref err) => $crate::error::ErrorClass::filter(err),
                    _ => wgt::ErrorFilter::Validation,
                }
            }
        }
    )*};
}
pub(crate) use device_error_class;

#[derive(Debug)]
struct ContextError {
    operation: &'static str,
    label: String,
    cause: Box<dyn error::Error + Send + Sync + 'static>,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label.is_empty() {
            write!(f, "In {}", self.operation)
        } else {
            write!(f, "In {}, label = '{}'", self.operation, self.label)
        }
    }
}

impl error::Error for ContextError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

pub(crate) fn format_error(err: &(dyn error::Error + 'static)) -> String {
    let mut err_descs = vec![format_error_line(err)];

    let mut source_opt = err.source();
    while let Some(source) = source_opt {
        err_descs.push(format_error_line(source));
        source_opt = source.source();
    }

    format!("Validation Error\n\nCaused by:\n{}", err_descs.join(""))
}

fn format_error_line(err: &dyn fmt::Display) -> String {
    format!("    {}\n", err)
}

/// Reason the device was lost.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceLostReason {
    /// The device was lost explicitly through [`Device::lose`](crate::Device::lose).
    Destroyed,
    /// The underlying context reported that it was lost.
    ContextLost,
}

/// Information delivered once a device is lost.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceLostInfo {
    /// Why the device was lost.
    pub reason: DeviceLostReason,
    /// Human-readable message.
    pub message: String,
}

/// Failure of [`Device::pop_error_scope`](crate::Device::pop_error_scope).
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PopErrorScopeError {
    #[error("Parent device is lost")]
    DeviceLost,
    #[error("There are no error scopes to pop")]
    EmptyStack,
    #[error("No error was captured by the scope")]
    NoErrorCaptured,
}

/// Type for the callback of uncaptured error handler
pub trait UncapturedErrorHandler: Fn(Error) + Send + Sync + 'static {}
impl<T> UncapturedErrorHandler for T where T: Fn(Error) + Send + Sync + 'static {}

fn default_error_handler(err: Error) {
    log::error!("Uncaptured webgpu-gl error: {}", err);
}

pub(crate) struct ErrorScope {
    pub filter: ErrorFilter,
    pub error: Option<Error>,
}

/// An error that escaped every scope and must be handed to `handler`
/// once no device lock is held.
pub(crate) struct Uncaptured {
    pub error: Error,
    pub handler: Arc<dyn UncapturedErrorHandler>,
}

impl Uncaptured {
    pub fn deliver(self) {
        (self.handler)(self.error);
    }
}

pub(crate) struct ErrorSink {
    scopes: Vec<ErrorScope>,
    handler: Arc<dyn UncapturedErrorHandler>,
    delivery: ErrorDelivery,
    deferred: Vec<Error>,
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorSink")
            .field("scopes", &self.scopes.len())
            .field("delivery", &self.delivery)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

impl ErrorSink {
    pub fn new(delivery: ErrorDelivery) -> Self {
        Self {
            scopes: Vec::new(),
            handler: Arc::new(default_error_handler),
            delivery,
            deferred: Vec::new(),
        }
    }

    pub fn push_scope(&mut self, filter: ErrorFilter) {
        self.scopes.push(ErrorScope {
            filter,
            error: None,
        });
    }

    pub fn pop_scope(&mut self) -> Option<ErrorScope> {
        self.scopes.pop()
    }

    pub fn set_handler(&mut self, handler: Arc<dyn UncapturedErrorHandler>) {
        self.handler = handler;
    }

    /// Offers the error to the innermost matching scope. Only the first
    /// error of a scope is kept.
    pub fn handle_error(&mut self, err: Error) -> Option<Uncaptured> {
        let filter = err.filter();
        match self
            .scopes
            .iter_mut()
            .rev()
            .find(|scope| scope.filter == filter)
        {
            Some(scope) => {
                if scope.error.is_none() {
                    scope.error = Some(err);
                }
                None
            }
            None => match self.delivery {
                ErrorDelivery::Immediate => Some(Uncaptured {
                    error: err,
                    handler: Arc::clone(&self.handler),
                }),
                ErrorDelivery::Deferred => {
                    self.deferred.push(err);
                    None
                }
            },
        }
    }

    pub fn take_deferred(&mut self) -> Vec<Uncaptured> {
        let handler = &self.handler;
        self.deferred
            .drain(..)
            .map(|error| Uncaptured {
                error,
                handler: Arc::clone(handler),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("Bad thing")]
    struct BadThing;
    impl ErrorClass for BadThing {}

    #[test]
    fn description_chain() {
        let err = Error::from_class(BadThing, "Device::create_buffer", "vertices");
        assert_eq!(err.filter(), ErrorFilter::Validation);
        assert_eq!(
            err.to_string(),
            "Validation Error\n\nCaused by:\n    In Device::create_buffer, label = 'vertices'\n    Bad thing\n"
        );
    }

    #[test]
    fn out_of_memory_classification() {
        let err = Error::from_class(DeviceError::OutOfMemory, "Device::create_texture", "");
        assert_eq!(err.filter(), ErrorFilter::OutOfMemory);
        let err = Error::from_class(DeviceError::Lost, "Device::create_texture", "");
        assert_eq!(err.filter(), ErrorFilter::Validation);
    }

    #[test]
    fn innermost_matching_scope_keeps_first_error() {
        let mut sink = ErrorSink::new(ErrorDelivery::Immediate);
        sink.push_scope(ErrorFilter::Validation);
        sink.push_scope(ErrorFilter::OutOfMemory);

        assert!(sink
            .handle_error(Error::from_class(BadThing, "first", ""))
            .is_none());
        assert!(sink
            .handle_error(Error::from_class(BadThing, "second", ""))
            .is_none());

        let oom = sink.pop_scope().unwrap();
        assert!(oom.error.is_none());
        let validation = sink.pop_scope().unwrap();
        assert!(validation
            .error
            .unwrap()
            .to_string()
            .contains("In first"));
        assert!(sink.pop_scope().is_none());
    }

    #[test]
    fn deferred_delivery() {
        let mut sink = ErrorSink::new(ErrorDelivery::Deferred);
        assert!(sink
            .handle_error(Error::from_class(BadThing, "op", ""))
            .is_none());
        assert_eq!(sink.take_deferred().len(), 1);
        assert!(sink.take_deferred().is_empty());

        let mut sink = ErrorSink::new(ErrorDelivery::Immediate);
        assert!(sink
            .handle_error(Error::from_class(BadThing, "op", ""))
            .is_some());
    }
}
