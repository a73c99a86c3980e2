//! Conversion of a response body into the representation a caller asked for.
//!
//! The engine only knows about raw bytes and text; anything richer is
//! delegated to a caller-provided [`Deserializable`] implementation.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{FuelError, Response};

/// Turns a completed [`Response`] into a typed payload.
///
/// Returning `Err` is classified as a decoding failure of the call; it is
/// never raised outside the completion.
pub trait Deserializable: Send + 'static {
    /// Payload type produced on success.
    type Output: Send + 'static;

    /// Decodes the response.
    ///
    /// # Errors
    ///
    /// Returns a [`FuelError::Decoding`] (or any other variant) when the body
    /// cannot be represented as `Self::Output`.
    fn deserialize(&self, response: &Response) -> Result<Self::Output, FuelError>;
}

/// Passes the body through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesDeserializer;

impl Deserializable for BytesDeserializer {
    type Output = Bytes;

    fn deserialize(&self, response: &Response) -> Result<Bytes, FuelError> {
        Ok(response.body().clone())
    }
}

/// Decodes the body as strict UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringDeserializer;

impl Deserializable for StringDeserializer {
    type Output = String;

    fn deserialize(&self, response: &Response) -> Result<String, FuelError> {
        String::from_utf8(response.body().to_vec()).map_err(|e| {
            FuelError::decoding_with_source(response.url().as_str(), response.clone(), e)
        })
    }
}

/// Decodes a JSON body into `T`.
pub struct JsonDeserializer<T>(PhantomData<fn() -> T>);

impl<T> JsonDeserializer<T> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonDeserializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deserializable for JsonDeserializer<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn deserialize(&self, response: &Response) -> Result<T, FuelError> {
        serde_json::from_slice(response.body()).map_err(|e| {
            FuelError::decoding_with_source(response.url().as_str(), response.clone(), e)
        })
    }
}

/// Adapts a closure into a [`Deserializable`].
pub struct FnDeserializer<F>(pub F);

impl<F, T> Deserializable for FnDeserializer<F>
where
    F: Fn(&Response) -> Result<T, FuelError> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn deserialize(&self, response: &Response) -> Result<T, FuelError> {
        (self.0)(response)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use url::Url;

    use super::*;
    use crate::ErrorKind;

    fn response(body: &'static [u8]) -> Response {
        Response::new(
            200,
            Url::parse("https://example.com/").unwrap(),
            BTreeMap::new(),
            Bytes::from_static(body),
        )
    }

    #[test]
    fn test_string_deserializer_accepts_utf8() {
        let text = StringDeserializer.deserialize(&response(b"caf\xc3\xa9")).unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn test_string_deserializer_rejects_invalid_utf8() {
        let error = StringDeserializer
            .deserialize(&response(b"\xff\xfe"))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Decoding);
        assert_eq!(error.status_code(), Some(200));
    }

    #[test]
    fn test_bytes_deserializer_is_identity() {
        let bytes = BytesDeserializer.deserialize(&response(b"\x00\x01")).unwrap();
        assert_eq!(bytes.as_ref(), b"\x00\x01");
    }

    #[test]
    fn test_json_deserializer_decodes_typed_payload() {
        #[derive(Debug, serde::Deserialize)]
        struct Echo {
            args: BTreeMap<String, String>,
        }

        let echo: Echo = JsonDeserializer::new()
            .deserialize(&response(br#"{"args":{"foo":"bar"}}"#))
            .unwrap();
        assert_eq!(echo.args["foo"], "bar");

        let error = JsonDeserializer::<Echo>::new()
            .deserialize(&response(b"not json"))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Decoding);
    }

    #[test]
    fn test_fn_deserializer_can_fail() {
        let length_only = FnDeserializer(|response: &Response| {
            if response.body().is_empty() {
                Err(FuelError::decoding(
                    response.url().as_str(),
                    "empty body",
                    response.clone(),
                ))
            } else {
                Ok(response.body().len())
            }
        });
        assert_eq!(length_only.deserialize(&response(b"abc")).unwrap(), 3);
        assert!(length_only.deserialize(&response(b"")).is_err());
    }
}
