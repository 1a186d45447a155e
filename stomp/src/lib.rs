//! stomp binds command-line arguments to the fields of a struct.
//!
//! Each field that should be populated from the command line declares the tokens that name it and
//! the value it takes when those tokens are absent:
//!
//! ```
//! use stomp::Args;
//! use stomp_derive::Args;
//!
//! #[derive(Args, Debug, Eq, PartialEq)]
//! struct Options {
//!     #[stomp(long = "--name", short = "-n", default = "world")]
//!     name: String,
//!     #[stomp(long = "--count", default = 1)]
//!     count: u32,
//!     not_an_option: u64,
//! }
//!
//! let options = Options::from_arguments(&["-n", "stomp"]).unwrap();
//! assert_eq!("stomp", options.name);
//! assert_eq!(1, options.count);
//! assert_eq!(0, options.not_an_option);
//! ```
//!
//! Names are matched verbatim:  stomp adds no dashes and performs no prefix matching.  Every option
//! takes exactly one value in the token that follows it.

use std::ffi::OsString;
use std::fmt::Display;
use std::str::FromStr;

use biometrics::{Collector, Counter};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static EXTRACT: Counter = Counter::new("stomp.extract");
static BIND: Counter = Counter::new("stomp.bind");
static OPTION_BOUND: Counter = Counter::new("stomp.option.bound");
static OPTION_DEFAULTED: Counter = Counter::new("stomp.option.defaulted");

static CONFIGURATION_ERROR: Counter = Counter::new("stomp.error.configuration");
static MISSING_VALUE: Counter = Counter::new("stomp.error.missing_value");
static INVALID_VALUE: Counter = Counter::new("stomp.error.invalid_value");
static MISSING_REQUIRED: Counter = Counter::new("stomp.error.missing_required");
static NOT_UNICODE: Counter = Counter::new("stomp.error.not_unicode");
static NOT_CANONICAL: Counter = Counter::new("stomp.error.not_canonical");

/// Register the biometrics for stomp.
pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&EXTRACT);
    collector.register_counter(&BIND);
    collector.register_counter(&OPTION_BOUND);
    collector.register_counter(&OPTION_DEFAULTED);
    collector.register_counter(&CONFIGURATION_ERROR);
    collector.register_counter(&MISSING_VALUE);
    collector.register_counter(&INVALID_VALUE);
    collector.register_counter(&MISSING_REQUIRED);
    collector.register_counter(&NOT_UNICODE);
    collector.register_counter(&NOT_CANONICAL);
}

//////////////////////////////////////// ConfigurationError ////////////////////////////////////////

/// The declarations of a type are malformed.  This is a bug in the program, not in its input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigurationError {
    /// The field declares a binding, but neither its long nor its short name is usable.
    NoMatchableName {
        /// The field carrying the binding.
        field: String,
    },
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::NoMatchableName { field } => {
                write!(f, "field `{field}` is bound but has neither a long nor a short name")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

//////////////////////////////////////////// ParseError ////////////////////////////////////////////

/// The arguments do not fit a valid set of declarations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The option is the last argument, so there is no value to take.
    MissingValue {
        /// The option exactly as it appeared in the arguments.
        option: String,
    },
    /// The value following the option does not convert to the field's type.
    InvalidValue {
        /// The field the value was meant for.
        field: String,
        /// The option exactly as it appeared in the arguments.
        option: String,
        /// The field's type as declared.
        expected: String,
        /// The raw value that failed to convert.
        value: String,
        /// Why `FromStr` rejected the value.
        reason: String,
    },
    /// A required option does not appear in the arguments.
    MissingRequired {
        /// The required field.
        field: String,
        /// The preferred name of the option:  its long name if it has one.
        option: String,
    },
    /// An argument of the process is not valid unicode.
    NotUnicode {
        /// The argument, with invalid sequences replaced by U+FFFD.
        argument: String,
    },
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingValue { option } => {
                write!(f, "missing value for option `{option}`")
            }
            ParseError::InvalidValue {
                field,
                option,
                expected,
                value,
                reason,
            } => {
                write!(
                    f,
                    "invalid value {value:?} for option `{option}` (field `{field}` expects {expected}): {reason}"
                )
            }
            ParseError::MissingRequired { field, option } => {
                write!(f, "required option `{option}` (field `{field}`) is missing")
            }
            ParseError::NotUnicode { argument } => {
                write!(f, "argument {argument:?} is not valid unicode")
            }
        }
    }
}

impl std::error::Error for ParseError {}

////////////////////////////////////////////// Error ///////////////////////////////////////////////

/// Either way a parse can fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The declarations of the type are malformed.
    Configuration(ConfigurationError),
    /// The arguments do not bind to the type.
    Parse(ParseError),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Configuration(err) => write!(f, "configuration error: {err}"),
            Error::Parse(err) => write!(f, "parse error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Configuration(err) => Some(err),
            Error::Parse(err) => Some(err),
        }
    }
}

impl From<ConfigurationError> for Error {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

////////////////////////////////////////// CanonicalError //////////////////////////////////////////

/// An instance has no command line that binds back to it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CanonicalError {
    /// The declarations of the type are malformed.
    Configuration(ConfigurationError),
    /// A value is spelled like the name of an option, so binding would take it for that option.
    AmbiguousValue {
        /// The field holding the value.
        field: String,
        /// The rendered value.
        value: String,
    },
    /// A field holds no value, but binding without it would not leave it empty:  it is required,
    /// or its default holds a value.
    NoValue {
        /// The field holding nothing.
        field: String,
    },
}

impl Display for CanonicalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanonicalError::Configuration(err) => write!(f, "configuration error: {err}"),
            CanonicalError::AmbiguousValue { field, value } => {
                write!(f, "value {value:?} of field `{field}` names an option")
            }
            CanonicalError::NoValue { field } => {
                write!(f, "field `{field}` holds no value and cannot be left out")
            }
        }
    }
}

impl std::error::Error for CanonicalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CanonicalError::Configuration(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigurationError> for CanonicalError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err)
    }
}

///////////////////////////////////////////// Binding //////////////////////////////////////////////

/// Converts a raw value and writes it into one field of `T`.
pub type Assign<T> = fn(&mut T, &str) -> Result<(), String>;

/// Reads one field of `T` back as the token that would bind it.  `None` means the field holds no
/// value that can be written on a command line.
pub type Render<T> = fn(&T) -> Option<String>;

/// A [Binding] describes how one field of `T` maps to command-line tokens.
///
/// The derive macro builds one per `#[stomp(...)]` field.  Hand-written [Args] impls build them
/// with [Binding::new] and the builder methods.
pub struct Binding<T> {
    field: &'static str,
    long: Option<&'static str>,
    short: Option<&'static str>,
    expected: &'static str,
    required: bool,
    assign: Assign<T>,
    render: Render<T>,
}

impl<T> Binding<T> {
    /// A binding for `field`, a field of type `expected`, with no names yet.
    pub fn new(
        field: &'static str,
        expected: &'static str,
        assign: Assign<T>,
        render: Render<T>,
    ) -> Self {
        Self {
            field,
            long: None,
            short: None,
            expected,
            required: false,
            assign,
            render,
        }
    }

    /// Set the long name.  An empty string is the same as no long name.
    pub fn long(mut self, long: &'static str) -> Self {
        self.long = Some(long);
        self
    }

    /// Set the short name.  An empty string is the same as no short name.
    pub fn short(mut self, short: &'static str) -> Self {
        self.short = Some(short);
        self
    }

    /// Make the option mandatory.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn long_name(&self) -> Option<&'static str> {
        self.long.filter(|name| !name.is_empty())
    }

    pub fn short_name(&self) -> Option<&'static str> {
        self.short.filter(|name| !name.is_empty())
    }

    pub fn expected(&self) -> &'static str {
        self.expected
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// True when the binding has no name to match.
    pub fn is_inert(&self) -> bool {
        self.long_name().is_none() && self.short_name().is_none()
    }

    /// The name used when talking about this option:  the long name, else the short name, else
    /// the field.
    pub fn option(&self) -> &'static str {
        self.long_name()
            .or_else(|| self.short_name())
            .unwrap_or(self.field)
    }

    /// Does `token` name this option?
    pub fn matches(&self, token: &str) -> bool {
        self.long_name() == Some(token) || self.short_name() == Some(token)
    }

    /// The index of the first argument naming this option.
    pub fn position<A: AsRef<str>>(&self, args: &[A]) -> Option<usize> {
        args.iter().position(|arg| self.matches(arg.as_ref()))
    }

    /// Convert `value` and write it into `bound`.
    pub fn assign(&self, bound: &mut T, value: &str) -> Result<(), String> {
        (self.assign)(bound, value)
    }

    /// Read this binding's field of `bound` as a token.
    pub fn render(&self, bound: &T) -> Option<String> {
        (self.render)(bound)
    }
}

impl<T: Args> Binding<T> {
    /// The declared default, rendered as a token.
    pub fn default_value(&self) -> Option<String> {
        self.render(&T::defaults())
    }
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            long: self.long,
            short: self.short,
            expected: self.expected,
            required: self.required,
            assign: self.assign,
            render: self.render,
        }
    }
}

impl<T> std::fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("field", &self.field)
            .field("long", &self.long)
            .field("short", &self.short)
            .field("expected", &self.expected)
            .field("required", &self.required)
            .finish()
    }
}

/////////////////////////////////////////////// Args ///////////////////////////////////////////////

/// A type whose fields bind to command-line arguments.  Derive it with `stomp_derive::Args`.
pub trait Args: Sized {
    /// An instance with every bound field at its declared default and every other field at its
    /// `Default`.
    fn defaults() -> Self;

    /// One binding per field that carries binding metadata, in declaration order.  These are not
    /// validated; use [extract] for that.
    fn declarations() -> Vec<Binding<Self>>;

    /// Parse the arguments of this process, less the program name.
    fn from_command_line() -> Result<Self, Error> {
        let args = unicode_arguments(std::env::args_os().skip(1))?;
        Self::from_arguments(&args)
    }

    /// Parse the provided arguments.
    fn from_arguments<A: AsRef<str>>(args: &[A]) -> Result<Self, Error> {
        parse(args)
    }

    /// The shortest command line that binds to `self`:  every field that differs from its default
    /// or is required, named by its long name if it has one.
    ///
    /// Binding the result yields `self` whenever every value round-trips through `FromStr`.  An
    /// instance that no command line binds to is an error:  a value spelled like any option's name
    /// would be taken for that option, and a field holding nothing cannot be written down unless
    /// leaving it out also leaves it empty.
    fn canonical_command_line(&self) -> Result<Vec<String>, CanonicalError> {
        let bindings = extract::<Self>()?;
        let defaults = Self::defaults();
        let mut result = Vec::new();
        for binding in bindings.iter() {
            let default = binding.render(&defaults);
            let value = match binding.render(self) {
                Some(value) => value,
                None if binding.is_required() || default.is_some() => {
                    NOT_CANONICAL.click();
                    return Err(CanonicalError::NoValue {
                        field: binding.field().to_string(),
                    });
                }
                None => {
                    continue;
                }
            };
            if !binding.is_required() && Some(&value) == default.as_ref() {
                continue;
            }
            if bindings.iter().any(|other| other.matches(&value)) {
                NOT_CANONICAL.click();
                return Err(CanonicalError::AmbiguousValue {
                    field: binding.field().to_string(),
                    value,
                });
            }
            result.push(binding.option().to_string());
            result.push(value);
        }
        Ok(result)
    }
}

///////////////////////////////////////////// extract //////////////////////////////////////////////

/// Extract the bindings of `T`, failing if any binding has no name to match.
pub fn extract<T: Args>() -> Result<Vec<Binding<T>>, ConfigurationError> {
    EXTRACT.click();
    let bindings = T::declarations();
    if let Some(binding) = bindings.iter().find(|binding| binding.is_inert()) {
        CONFIGURATION_ERROR.click();
        return Err(ConfigurationError::NoMatchableName {
            field: binding.field().to_string(),
        });
    }
    Ok(bindings)
}

/////////////////////////////////////////////// bind ///////////////////////////////////////////////

/// Bind `args` to a fresh `T` using `bindings`.
///
/// Each binding scans all of `args` on its own and takes the token after the first one that names
/// it.  Tokens are never consumed, so one token may serve several bindings.  Bindings that match
/// nothing leave the default in place.  Inert bindings never match.
pub fn bind<T: Args, A: AsRef<str>>(args: &[A], bindings: &[Binding<T>]) -> Result<T, ParseError> {
    BIND.click();
    let mut bound = T::defaults();
    for binding in bindings.iter() {
        let idx = match binding.position(args) {
            Some(idx) => idx,
            None if binding.is_required() => {
                MISSING_REQUIRED.click();
                return Err(ParseError::MissingRequired {
                    field: binding.field().to_string(),
                    option: binding.option().to_string(),
                });
            }
            None => {
                OPTION_DEFAULTED.click();
                continue;
            }
        };
        let option = args[idx].as_ref();
        let value = match args.get(idx + 1) {
            Some(value) => value.as_ref(),
            None => {
                MISSING_VALUE.click();
                return Err(ParseError::MissingValue {
                    option: option.to_string(),
                });
            }
        };
        if let Err(reason) = binding.assign(&mut bound, value) {
            INVALID_VALUE.click();
            return Err(ParseError::InvalidValue {
                field: binding.field().to_string(),
                option: option.to_string(),
                expected: binding.expected().to_string(),
                value: value.to_string(),
                reason,
            });
        }
        OPTION_BOUND.click();
    }
    Ok(bound)
}

////////////////////////////////////////////// parse ///////////////////////////////////////////////

/// Extract the bindings of `T` and bind `args` with them.
pub fn parse<T: Args, A: AsRef<str>>(args: &[A]) -> Result<T, Error> {
    let bindings = extract::<T>()?;
    Ok(bind(args, &bindings)?)
}

/// Collect process arguments as strings, failing on the first that is not unicode.
fn unicode_arguments<I: IntoIterator<Item = OsString>>(
    args: I,
) -> Result<Vec<String>, ParseError> {
    args.into_iter()
        .map(|arg| {
            arg.into_string().map_err(|arg| {
                NOT_UNICODE.click();
                ParseError::NotUnicode {
                    argument: arg.to_string_lossy().into_owned(),
                }
            })
        })
        .collect()
}

/////////////////////////////////////////// macro utils ////////////////////////////////////////////

/// Convert one raw value with `FromStr`, keeping the error's message.
pub fn parse_field<V>(s: &str) -> Result<V, String>
where
    V: FromStr,
    <V as FromStr>::Err: Display,
{
    s.parse::<V>().map_err(|err| err.to_string())
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Eq, PartialEq)]
    struct Words {
        firstword: String,
        secondword: String,
        count: u32,
    }

    impl Args for Words {
        fn defaults() -> Self {
            Self {
                firstword: String::new(),
                secondword: String::new(),
                count: 7,
            }
        }

        fn declarations() -> Vec<Binding<Self>> {
            vec![
                Binding::new(
                    "firstword",
                    "String",
                    |bound: &mut Self, s: &str| -> Result<(), String> {
                        bound.firstword = parse_field(s)?;
                        Ok(())
                    },
                    |bound: &Self| Some(bound.firstword.clone()),
                )
                .long("your")
                .short("f"),
                Binding::new(
                    "count",
                    "u32",
                    |bound: &mut Self, s: &str| -> Result<(), String> {
                        bound.count = parse_field(s)?;
                        Ok(())
                    },
                    |bound: &Self| Some(bound.count.to_string()),
                )
                .short("-c"),
            ]
        }
    }

    struct Unnamed {
        flag: bool,
    }

    impl Args for Unnamed {
        fn defaults() -> Self {
            Self { flag: false }
        }

        fn declarations() -> Vec<Binding<Self>> {
            vec![Binding::new(
                "flag",
                "bool",
                |bound: &mut Self, s: &str| -> Result<(), String> {
                    bound.flag = parse_field(s)?;
                    Ok(())
                },
                |bound: &Self| Some(bound.flag.to_string()),
            )
            .long("")
            .short("")]
        }
    }

    #[test]
    fn extract_in_declaration_order() {
        let bindings = extract::<Words>().unwrap();
        let fields: Vec<&str> = bindings.iter().map(Binding::field).collect();
        assert_eq!(vec!["firstword", "count"], fields);
        assert_eq!(Some("your"), bindings[0].long_name());
        assert_eq!(Some("f"), bindings[0].short_name());
        assert_eq!(None, bindings[1].long_name());
        assert_eq!("-c", bindings[1].option());
    }

    #[test]
    fn extract_rejects_unnamed() {
        assert_eq!(
            ConfigurationError::NoMatchableName {
                field: "flag".to_string()
            },
            extract::<Unnamed>().unwrap_err()
        );
    }

    #[test]
    fn parse_rejects_unnamed_before_scanning() {
        let err = parse::<Unnamed, _>(&["", "not-a-bool"]).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn bind_skips_inert() {
        let bindings = Unnamed::declarations();
        let bound = bind(&["", "true"], &bindings).unwrap();
        assert!(!bound.flag);
    }

    #[test]
    fn default_value() {
        let bindings = extract::<Words>().unwrap();
        assert_eq!(Some(String::new()), bindings[0].default_value());
        assert_eq!(Some("7".to_string()), bindings[1].default_value());
    }

    #[test]
    fn long_or_short() {
        let long: Words = parse(&["your", "hello", "extra"]).unwrap();
        let short: Words = parse(&["f", "hello"]).unwrap();
        assert_eq!(long, short);
        assert_eq!("hello", long.firstword);
        assert_eq!("", long.secondword);
        assert_eq!(7, long.count);
    }

    #[test]
    fn first_occurrence_wins() {
        let words: Words = parse(&["f", "one", "your", "two", "f", "three"]).unwrap();
        assert_eq!("one", words.firstword);
    }

    #[test]
    fn tokens_are_shared() {
        // "-c" is both the value of "your" and the name of count.
        let words: Words = parse(&["your", "-c", "12"]).unwrap();
        assert_eq!("-c", words.firstword);
        assert_eq!(12, words.count);
    }

    #[test]
    fn missing_value() {
        assert_eq!(
            Error::Parse(ParseError::MissingValue {
                option: "your".to_string()
            }),
            parse::<Words, _>(&["your"]).unwrap_err()
        );
    }

    #[test]
    fn invalid_value() {
        match parse::<Words, _>(&["-c", "many"]).unwrap_err() {
            Error::Parse(ParseError::InvalidValue {
                field,
                option,
                expected,
                value,
                reason: _,
            }) => {
                assert_eq!("count", field);
                assert_eq!("-c", option);
                assert_eq!("u32", expected);
                assert_eq!("many", value);
            }
            err => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn missing_required() {
        let bindings = vec![Words::declarations().remove(1).required()];
        assert_eq!(
            ParseError::MissingRequired {
                field: "count".to_string(),
                option: "-c".to_string(),
            },
            bind(&["your", "hello"], &bindings).unwrap_err()
        );
    }

    #[test]
    fn canonical_command_line() {
        let words = Words {
            firstword: "hello".to_string(),
            secondword: "ignored".to_string(),
            count: 7,
        };
        assert_eq!(
            vec!["your".to_string(), "hello".to_string()],
            words.canonical_command_line().unwrap()
        );
        assert!(Words::defaults().canonical_command_line().unwrap().is_empty());
    }

    #[test]
    fn canonical_command_line_rejects_values_named_like_options() {
        let words = Words {
            firstword: "-c".to_string(),
            secondword: String::new(),
            count: 9,
        };
        // ["your", "-c", "-c", "9"] would bind "-c" as the count.
        assert_eq!(
            CanonicalError::AmbiguousValue {
                field: "firstword".to_string(),
                value: "-c".to_string(),
            },
            words.canonical_command_line().unwrap_err()
        );
        let words = Words {
            firstword: "your".to_string(),
            secondword: String::new(),
            count: 7,
        };
        assert!(words.canonical_command_line().is_err());
        let words = Words {
            firstword: "--your".to_string(),
            secondword: String::new(),
            count: 7,
        };
        let canonical = words.canonical_command_line().unwrap();
        assert_eq!(words, Words::from_arguments(&canonical).unwrap());
    }

    #[test]
    fn canonical_command_line_rejects_unnamed() {
        assert_eq!(
            CanonicalError::Configuration(ConfigurationError::NoMatchableName {
                field: "flag".to_string()
            }),
            Unnamed { flag: true }.canonical_command_line().unwrap_err()
        );
    }

    #[test]
    fn unicode_arguments_pass_through() {
        let args = vec![OsString::from("your"), OsString::from("héllo")];
        assert_eq!(
            vec!["your".to_string(), "héllo".to_string()],
            unicode_arguments(args).unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn unicode_arguments_reject_invalid_sequences() {
        use std::os::unix::ffi::OsStringExt;
        let args = vec![
            OsString::from("your"),
            OsString::from_vec(vec![b'h', 0xff, b'i']),
        ];
        assert_eq!(
            ParseError::NotUnicode {
                argument: "h\u{fffd}i".to_string(),
            },
            unicode_arguments(args).unwrap_err()
        );
    }

    #[test]
    fn display() {
        assert_eq!(
            "missing value for option `your`",
            ParseError::MissingValue {
                option: "your".to_string()
            }
            .to_string()
        );
        assert_eq!(
            "field `flag` is bound but has neither a long nor a short name",
            ConfigurationError::NoMatchableName {
                field: "flag".to_string()
            }
            .to_string()
        );
        assert_eq!(
            "required option `--first` (field `first_word`) is missing",
            ParseError::MissingRequired {
                field: "first_word".to_string(),
                option: "--first".to_string(),
            }
            .to_string()
        );
        assert_eq!(
            "value \"-c\" of field `firstword` names an option",
            CanonicalError::AmbiguousValue {
                field: "firstword".to_string(),
                value: "-c".to_string(),
            }
            .to_string()
        );
    }
}
