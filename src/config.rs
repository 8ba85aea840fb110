// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : tenant_bill_rust — monthly tenant utility bill generator in Rust
Module  : config.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
License : MIT (see LICENSE)

Summary : Computes one tenant's monthly bill (rent, metered electricity,
          shared pump cost, society charge, arrears), renders it as a PDF
          and archives it into a per-month Google Drive folder.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use dotenvy::dotenv;
use rust_decimal::Decimal;
use thiserror::Error;
use url::Url;

pub const DEFAULT_BANNER: &str = "!! JAI SHREE RAM !! | !! JAI GURUJI !! | !! JAI MATA DI !!";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must not be negative")]
    Negative { key: &'static str },
}

/// Sumber credential service account
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    /// JSON key held in an environment secret (deployed mode)
    EnvSecret,
    /// JSON key file on disk (local mode)
    File,
}

impl CredentialSource {
    pub fn from_env(key: &str, default_mode: CredentialSource) -> CredentialSource {
        match env::var(key).unwrap_or_default().to_ascii_lowercase().as_str() {
            "env" | "secret" | "env_secret" => CredentialSource::EnvSecret,
            "file"                          => CredentialSource::File,
            _ => default_mode,
        }
    }
}

/// Tarif per periode (dipakai TariffCalculator)
#[derive(Clone, Debug)]
pub struct TariffConfig {
    pub rate_per_unit: Decimal,
    pub society_charge: Decimal,
}

/// Identitas properti (dipakai BillRenderer)
#[derive(Clone, Debug)]
pub struct PropertyConfig {
    pub name: String,
    pub address: String,
    pub banner: String,
    pub payment_mobile: Option<String>,
    pub query_contact: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ArchiveConfig {
    pub enabled: bool,
    pub root_folder_id: String,
    pub credential_source: CredentialSource,
    pub credential_env_var: String,
    pub credential_file: PathBuf,
    pub drive_api_url: Url,
    pub drive_upload_url: Url,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub tariff: TariffConfig,
    pub property: PropertyConfig,
    pub archive: ArchiveConfig,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self { rate_per_unit: Decimal::from(8), society_charge: Decimal::from(200) }
    }
}

impl Default for PropertyConfig {
    fn default() -> Self {
        Self {
            name: "Maa Anjana Apartments".to_string(),
            address: "O-47A Karmyogi Enclave Kamla Nagar, Agra, UP 282005".to_string(),
            banner: DEFAULT_BANNER.to_string(),
            payment_mobile: None,
            query_contact: None,
        }
    }
}

fn decimal_var(key: &'static str, default: Decimal) -> Result<Decimal, ConfigError> {
    let value = match env::var(key) {
        Ok(raw) => Decimal::from_str(raw.trim())
            .map_err(|_| ConfigError::Invalid { key, value: raw.clone() })?,
        Err(_) => default,
    };
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ConfigError::Negative { key });
    }
    Ok(value)
}

fn url_var(key: &'static str, default: &str) -> Result<Url, ConfigError> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|_| ConfigError::Invalid { key, value: raw })
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn bool_var(key: &str, default: bool) -> bool {
    match env::var(key).unwrap_or_default().trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

pub fn load() -> Result<AppConfig, ConfigError> {
    // Pastikan .env dibaca (agar RATE_PER_UNIT, DRIVE_ROOT_FOLDER_ID, dll ter-load)
    let _ = dotenv();

    // ===== Tariff =====
    let defaults = TariffConfig::default();
    let tariff = TariffConfig {
        rate_per_unit: decimal_var("RATE_PER_UNIT", defaults.rate_per_unit)?,
        society_charge: decimal_var("SOCIETY_CHARGE", defaults.society_charge)?,
    };

    // ===== Property =====
    let defaults = PropertyConfig::default();
    let property = PropertyConfig {
        name: optional_var("PROPERTY_NAME").unwrap_or(defaults.name),
        address: optional_var("PROPERTY_ADDRESS").unwrap_or(defaults.address),
        banner: optional_var("BILL_BANNER").unwrap_or(defaults.banner),
        payment_mobile: optional_var("PAYMENT_MOBILE"),
        query_contact: optional_var("QUERY_CONTACT"),
    };

    // ===== Archive (Google Drive) =====
    // Contoh:
    //   DRIVE_ROOT_FOLDER_ID=1AbC...
    //   CREDENTIAL_SOURCE=env   -> GCP_SERVICE_ACCOUNT='{"client_email": ...}'
    //   CREDENTIAL_SOURCE=file  -> CREDENTIAL_FILE=service_account_key.json
    let root_folder_id = optional_var("DRIVE_ROOT_FOLDER_ID").unwrap_or_default();
    let archive = ArchiveConfig {
        enabled: bool_var("ARCHIVE_ENABLED", true) && !root_folder_id.is_empty(),
        root_folder_id,
        credential_source: CredentialSource::from_env("CREDENTIAL_SOURCE", CredentialSource::File),
        credential_env_var: optional_var("CREDENTIAL_ENV_VAR")
            .unwrap_or_else(|| "GCP_SERVICE_ACCOUNT".to_string()),
        credential_file: optional_var("CREDENTIAL_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("service_account_key.json")),
        drive_api_url: url_var("DRIVE_API_URL", "https://www.googleapis.com/drive/v3/")?,
        drive_upload_url: url_var("DRIVE_UPLOAD_URL", "https://www.googleapis.com/upload/drive/v3/")?,
    };

    Ok(AppConfig { tariff, property, archive })
}
