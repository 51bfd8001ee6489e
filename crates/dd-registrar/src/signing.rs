/// Request signing: AWS Signature Version 4 and the HMAC scheme used by
/// signed reseller APIs.

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::RegistrarError;

type HmacSha256 = Hmac<Sha256>;

const AWS_ALGORITHM: &str = "AWS4-HMAC-SHA256";

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, RegistrarError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| RegistrarError::InvalidRequest(format!("unusable signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// ─── AWS SigV4 ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub service: String,
}

/// The parts of an HTTP request that SigV4 covers.
#[derive(Debug, Clone)]
pub struct SigningInput<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a [(String, String)],
    /// Headers to sign, excluding `x-amz-date` which the signer adds.
    pub headers: &'a [(String, String)],
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
}

pub fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Result<Vec<u8>, RegistrarError> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding as SigV4 wants it: unreserved characters stay, the rest
/// become `%XX` with upper-case hex.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Canonical request plus the `SignedHeaders` list.
pub fn canonical_request(input: &SigningInput<'_>, amz_date: &str) -> (String, String) {
    let path = if input.path.is_empty() { "/" } else { input.path };
    let canonical_uri = uri_encode(path, false);

    let mut query: Vec<(String, String)> = input
        .query
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    query.sort();
    let canonical_query = query
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut headers: Vec<(String, String)> = input
        .headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.split_whitespace().collect::<Vec<_>>().join(" ")))
        .collect();
    headers.push(("x-amz-date".to_string(), amz_date.to_string()));
    headers.sort();
    let canonical_headers: String = headers.iter().map(|(k, v)| format!("{}:{}\n", k, v)).collect();
    let signed_headers = headers.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(";");

    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        input.method.to_uppercase(),
        canonical_uri,
        canonical_query,
        canonical_headers,
        signed_headers,
        sha256_hex(input.payload)
    );
    (canonical, signed_headers)
}

pub fn sign_v4(
    credentials: &AwsCredentials,
    input: &SigningInput<'_>,
    now: DateTime<Utc>,
) -> Result<SignedHeaders, RegistrarError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let (canonical, signed_headers) = canonical_request(input, &amz_date);

    let scope = format!(
        "{}/{}/{}/aws4_request",
        date_stamp, credentials.region, credentials.service
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        AWS_ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical.as_bytes())
    );
    let key = signing_key(
        &credentials.secret_access_key,
        &date_stamp,
        &credentials.region,
        &credentials.service,
    )?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        authorization: format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            AWS_ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
        ),
        amz_date,
        content_sha256: sha256_hex(input.payload),
    })
}

// ─── Signed reseller APIs ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignatureEncoding {
    #[default]
    Hex,
    Base64,
}

/// `X-Signature` value: HMAC-SHA256 keyed by the API secret over
/// `api_key + METHOD + path + unix_timestamp`.
pub fn api_signature(
    api_key: &str,
    secret: &str,
    method: &str,
    path: &str,
    timestamp: i64,
    encoding: SignatureEncoding,
) -> Result<String, RegistrarError> {
    let message = format!("{}{}{}{}", api_key, method.to_uppercase(), path, timestamp);
    let mac = hmac_sha256(secret.as_bytes(), message.as_bytes())?;
    Ok(match encoding {
        SignatureEncoding::Hex => hex::encode(mac),
        SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(mac),
    })
}
