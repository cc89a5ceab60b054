use std::{fmt, io};
use std::panic::Location;
use std::error::Error as StdError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The broad class of a failure, used by callers to tell a bad content file
/// apart from a broken template without parsing messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The bundler configuration is missing or invalid.
    Config,
    /// A content file could not be parsed.
    Parse,
    /// The templates failed to compile or the bundle failed to evaluate.
    Compile,
    /// An entry names a render function the artifact does not export.
    RenderFunctionMissing,
    /// A render function produced something other than a string.
    RenderOutput,
    Io,
    Other,
}

/// A failure and the chain of failures that caused it.
///
/// Each link holds one or more [`ErrorDetail`]s: a message plus `key: value`
/// context. Links are added outermost-last with [`Chainable::chain_with`], so
/// the error reads from what the caller was doing down to what went wrong.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    details: Vec<Box<dyn ErrorDetail>>,
    cause: Option<Box<Error>>,
    location: &'static Location<'static>,
}

pub trait ErrorDetail: fmt::Display + fmt::Debug + Send + Sync {
    fn context(&self) -> Vec<(Option<String>, String)> { vec![] }

    fn kind(&self) -> ErrorKind { ErrorKind::Other }
}

impl Error {
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// The outermost explicit kind in the chain, `Other` if there is none.
    pub fn kind(&self) -> ErrorKind {
        self.links()
            .map(|e| e.kind)
            .find(|kind| *kind != ErrorKind::Other)
            .unwrap_or(ErrorKind::Other)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Makes `self` the innermost cause of `outer`.
    pub fn chain(self, mut outer: Error) -> Self {
        let mut slot = &mut outer.cause;
        while let Some(next) = slot {
            slot = &mut next.cause;
        }

        *slot = Some(Box::new(self));
        outer
    }

    /// This error followed by each of its causes.
    fn links(&self) -> impl Iterator<Item = &Error> {
        std::iter::successors(Some(self), |e| e.cause.as_deref())
    }

    fn write_nested(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = " ".repeat(depth * 4);
        let newline = format!("\n{indent}");
        for detail in &self.details {
            writeln!(f, "{indent}{}", format!("{detail:#}").replace('\n', &newline))?;
            if let Some(cause) = &self.cause {
                cause.write_nested(f, depth + 1)?;
            }

            for (key, value) in detail.context() {
                let value = value.replace('\n', &newline);
                match key {
                    Some(key) => writeln!(f, "{indent}{key}: {value}")?,
                    None => writeln!(f, "{indent}{value}")?,
                }
            }

            if std::env::var_os("RUST_BACKTRACE").is_some() {
                writeln!(f, "{indent}[{}]", self.location)?;
            }
        }

        Ok(())
    }
}

/// The `source()` chain of `error`, one line per cause.
fn sources(error: &(dyn StdError + 'static)) -> Vec<(Option<String>, String)> {
    std::iter::successors(error.source(), |e| (*e).source())
        .map(|e| (None, e.to_string()))
        .collect()
}

macro_rules! impl_error_detail_with_std_error {
    ($T:ty) => { impl_error_detail_with_std_error!($T => Other); };
    ($T:ty => $kind:ident) => {
        impl $crate::error::ErrorDetail for $T {
            fn context(&self) -> Vec<(Option<String>, String)> {
                sources(self)
            }

            fn kind(&self) -> $crate::error::ErrorKind {
                $crate::error::ErrorKind::$kind
            }
        }
    }
}

impl_error_detail_with_std_error!(io::Error => Io);
impl_error_detail_with_std_error!(toml::de::Error => Parse);
impl_error_detail_with_std_error!(serde_json::Error => Parse);
impl_error_detail_with_std_error!(serde_yaml::Error => Parse);
impl_error_detail_with_std_error!(notify::Error => Io);
impl_error_detail_with_std_error!(mlua::Error);
impl_error_detail_with_std_error!(tokio::task::JoinError);

impl ErrorDetail for String { }
impl ErrorDetail for &'static str { }

impl Clone for Error {
    fn clone(&self) -> Self {
        let details = self.details.iter()
            .map(|detail| Box::new(MakeshiftError::from(&**detail)) as Box<dyn ErrorDetail>)
            .collect();

        Error { kind: self.kind, details, cause: self.cause.clone(), location: self.location }
    }
}

impl<T: ErrorDetail + 'static> From<T> for Error {
    #[track_caller]
    fn from(detail: T) -> Self {
        Error {
            kind: detail.kind(),
            details: vec![Box::new(detail)],
            cause: None,
            location: Location::caller(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_nested(f, 0)
    }
}

impl StdError for Error { }

/// An ad-hoc detail built by [`error!`].
#[derive(Debug)]
pub struct MakeshiftError {
    pub message: String,
    pub parameters: Vec<(Option<String>, String)>,
}

impl From<&dyn ErrorDetail> for MakeshiftError {
    fn from(detail: &dyn ErrorDetail) -> Self {
        MakeshiftError { message: detail.to_string(), parameters: detail.context() }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! err {
    ($($token:tt)*) => (Err($crate::error!($($token)*)));
}

/// Builds an [`Error`] from a message followed by `"key" => value` context
/// pairs or bare values.
#[doc(hidden)]
#[macro_export]
macro_rules! error {
    ($msg:expr $(, $($rest:tt)*)?) => (
        $crate::error::Error::from($crate::error::MakeshiftError {
            message: $msg.to_string(),
            parameters: {
                #[allow(unused_mut)]
                let mut v: Vec<(Option<String>, String)> = Vec::new();
                $($crate::error!(@param v $($rest)*);)?
                v
            },
        })
    );

    (@param $v:ident $key:expr => $value:expr $(, $($rest:tt)*)?) => {
        $v.push((Some($key.to_string()), $value.to_string()));
        $($crate::error!(@param $v $($rest)*);)?
    };

    (@param $v:ident $value:expr $(, $($rest:tt)*)?) => {
        $v.push((None, $value.to_string()));
        $($crate::error!(@param $v $($rest)*);)?
    };

    (@param $v:ident) => { };
}

impl fmt::Display for MakeshiftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl ErrorDetail for MakeshiftError {
    fn context(&self) -> Vec<(Option<String>, String)> {
        self.parameters.clone()
    }
}

pub trait Chainable<T> {
    /// On failure, wraps the error in `outer`.
    fn chain(self, outer: impl Into<Error>) -> Result<T>;

    /// Like [`Chainable::chain`], building `outer` only on failure.
    fn chain_with<F, E>(self, f: F) -> Result<T>
        where F: FnOnce() -> E, E: Into<Error>;
}

impl<T, E: Into<Error>> Chainable<T> for Result<T, E> {
    #[track_caller]
    fn chain(self, outer: impl Into<Error>) -> Result<T> {
        self.map_err(|e| e.into().chain(outer.into()))
    }

    #[track_caller]
    fn chain_with<F, O>(self, f: F) -> Result<T>
        where F: FnOnce() -> O, O: Into<Error>,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().chain(f().into())),
        }
    }
}
