use super::error::{Result, TetherError};
use super::marshal::{Marshal, Payload, TypeName};

/// Identifies a remotely invocable interface.
///
/// Implemented on the trait-object type of the interface:
///
/// ```
/// use tether_common::protocol::Interface;
///
/// pub trait Greeter: Send + Sync {
///     fn greet(&self, name: String) -> String;
/// }
///
/// impl Interface for dyn Greeter {
///     const ID: &'static str = "demo.Greeter";
/// }
///
/// assert_eq!(<dyn Greeter as Interface>::ID, "demo.Greeter");
/// ```
pub trait Interface: Send + Sync + 'static {
    const ID: &'static str;
}

/// An ordered argument list, implemented for tuples of up to four
/// [`Marshal`] values.
pub trait Params: Sized {
    /// Declared parameter types, in order.
    fn type_names() -> Vec<TypeName>;

    fn into_payloads(self) -> Result<Vec<Payload>>;

    fn from_payloads(payloads: Vec<Payload>) -> Result<Self>;
}

fn arity_mismatch(expected: usize, found: usize) -> TetherError {
    TetherError::mismatch(
        format!("{} parameters", expected),
        format!("{} parameters", found),
    )
}

impl Params for () {
    fn type_names() -> Vec<TypeName> {
        Vec::new()
    }

    fn into_payloads(self) -> Result<Vec<Payload>> {
        Ok(Vec::new())
    }

    fn from_payloads(payloads: Vec<Payload>) -> Result<Self> {
        if payloads.is_empty() {
            Ok(())
        } else {
            Err(arity_mismatch(0, payloads.len()))
        }
    }
}

macro_rules! tuple_params {
    ($count:literal; $($name:ident),+) => {
        impl<$($name: Marshal),+> Params for ($($name,)+) {
            fn type_names() -> Vec<TypeName> {
                vec![$($name::type_name()),+]
            }

            #[allow(non_snake_case)]
            fn into_payloads(self) -> Result<Vec<Payload>> {
                let ($($name,)+) = self;
                Ok(vec![$($name.to_payload()?),+])
            }

            #[allow(non_snake_case)]
            fn from_payloads(payloads: Vec<Payload>) -> Result<Self> {
                if payloads.len() != $count {
                    return Err(arity_mismatch($count, payloads.len()));
                }
                let mut payloads = payloads.into_iter();
                $(
                    let $name = match payloads.next() {
                        Some(payload) => $name::from_payload(payload)?,
                        None => return Err(arity_mismatch($count, 0)),
                    };
                )+
                Ok(($($name,)+))
            }
        }
    };
}

tuple_params!(1; A);
tuple_params!(2; A, B);
tuple_params!(3; A, B, C);
tuple_params!(4; A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::marshal::Native;

    #[test]
    fn test_type_names_follow_declaration_order() {
        assert_eq!(
            <(String, String, i32)>::type_names(),
            vec!["String".to_string(), "String".to_string(), "i32".to_string()]
        );
        assert!(<()>::type_names().is_empty());
        assert_eq!(<(Option<i32>,)>::type_names(), vec!["Option<i32>".to_string()]);
    }

    #[test]
    fn test_payloads_preserve_order() {
        let payloads = ("alice".to_string(), 30i32).into_payloads().unwrap();
        assert_eq!(
            payloads,
            vec![
                Payload::Native(Native::Str("alice".into())),
                Payload::Native(Native::Int(30)),
            ]
        );

        let (name, age) = <(String, i32)>::from_payloads(payloads).unwrap();
        assert_eq!(name, "alice");
        assert_eq!(age, 30);
    }

    #[test]
    fn test_wrong_arity_is_mismatch() {
        let payloads = vec![Payload::Native(Native::Int(1))];
        assert!(matches!(
            <(i32, i32)>::from_payloads(payloads.clone()),
            Err(TetherError::TypeMismatch { .. })
        ));
        assert!(matches!(
            <()>::from_payloads(payloads),
            Err(TetherError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_null_argument_for_nullable_slot() {
        let (value,) = <(Option<i32>,)>::from_payloads(vec![Payload::Null]).unwrap();
        assert_eq!(value, None);
    }
}
