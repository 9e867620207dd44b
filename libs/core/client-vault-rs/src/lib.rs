// [libs/core/client-vault-rs/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DEVICE CONFIG VAULT ENGINE (V4.1 - SCRYPT SEALED)
 * CLASIFICACIÓN: CORE SECURITY (ESTRATO L1)
 * RESPONSABILIDAD: CIFRADO ZERO-KNOWLEDGE DE LA CONFIGURACIÓN LOCAL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. LAYOUT SOBERANO: El fichero es sal(32) ‖ nonce(12) ‖ ciphertext;
 *    la sal viaja prefijada y el nonce precede al material cifrado.
 * 2. SCRYPT DERIVATION: N=32768 (log2=15), r=8, p=1, llave de 32 bytes.
 * 3. TOTAL MASKING: Una contraseña incorrecta y un fichero corrupto
 *    producen el mismo fallo 'DecryptFailed'; jamás se expone material
 *    parcial.
 *
 * # Mathematical Proof (Authenticated Secrecy):
 * GCM autentica el ciphertext completo: cualquier bit alterado del
 * fichero invalida la etiqueta y el descifrado colapsa atómicamente.
 * =================================================================
 */

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use scrypt::{scrypt, Params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Bytes de sal prefijados al fichero.
const SALT_LENGTH_BYTES: usize = 32;

/// Bytes del nonce GCM que preceden al ciphertext.
const NONCE_LENGTH_BYTES: usize = 12;

/// Longitud de la llave derivada (AES-256).
const KEY_LENGTH_BYTES: usize = 32;

/// Parámetros scrypt: N = 2^15 = 32768, r = 8, p = 1.
const SCRYPT_LOG2_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

#[derive(Error, Debug)]
pub enum VaultError {
    /// Fallo de E/S sobre el fichero de configuración.
    #[error("[L1_VAULT_FAULT]: CONFIG_IO -> {0}")]
    Io(#[from] std::io::Error),

    /// La configuración no serializa (estado interno corrupto).
    #[error("[L1_VAULT_FAULT]: CONFIG_ENCODING -> {0}")]
    Encoding(String),

    /// Contraseña incorrecta O fichero manipulado: indistinguibles por
    /// diseño; ningún material parcial abandona la bóveda.
    #[error("[L1_VAULT_FAULT]: DECRYPT_FAILED")]
    DecryptFailed,

    /// El fichero es demasiado corto para contener sal + nonce.
    #[error("[L1_VAULT_FAULT]: VAULT_TRUNCATED")]
    Truncated,
}

/// Configuración local del dispositivo emitida por el registro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(rename = "server_url")]
    pub server_url: String,

    #[serde(rename = "device_id")]
    pub device_id: String,

    #[serde(rename = "virtual_network_id")]
    pub virtual_network_id: String,

    #[serde(rename = "virtual_ip")]
    pub virtual_ip: String,

    /// Mitad privada de la llave registrada del dispositivo (base64).
    /// Firma las peticiones contra el plano de control.
    #[serde(rename = "private_key_base64")]
    pub private_key_base64: String,
}

pub struct ConfigVault;

impl ConfigVault {
    fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; KEY_LENGTH_BYTES], VaultError> {
        let parameters = Params::new(SCRYPT_LOG2_N, SCRYPT_R, SCRYPT_P, KEY_LENGTH_BYTES)
            .map_err(|fault| VaultError::Encoding(fault.to_string()))?;

        let mut derived_key = [0u8; KEY_LENGTH_BYTES];
        scrypt(password.as_bytes(), salt, &parameters, &mut derived_key)
            .map_err(|fault| VaultError::Encoding(fault.to_string()))?;
        Ok(derived_key)
    }

    /**
     * Sella la configuración en disco bajo la contraseña del operador.
     *
     * # Logic:
     * 1. Sal aleatoria de 32 bytes + derivación scrypt.
     * 2. Nonce GCM aleatorio de 12 bytes.
     * 3. Escritura atómica: sal ‖ nonce ‖ ciphertext.
     */
    pub fn save(
        config: &DeviceConfig,
        path: &Path,
        password: &str,
    ) -> Result<(), VaultError> {
        let plaintext = serde_json::to_vec(config)
            .map_err(|fault| VaultError::Encoding(fault.to_string()))?;

        let salt: [u8; SALT_LENGTH_BYTES] = rand::random();
        let derived_key = Self::derive_key(password, &salt)?;

        let cipher_engine = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derived_key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher_engine
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| VaultError::Encoding("GCM_SEAL_FAILURE".into()))?;

        let mut vault_bytes =
            Vec::with_capacity(SALT_LENGTH_BYTES + NONCE_LENGTH_BYTES + ciphertext.len());
        vault_bytes.extend_from_slice(&salt);
        vault_bytes.extend_from_slice(&nonce);
        vault_bytes.extend_from_slice(&ciphertext);

        std::fs::write(path, vault_bytes)?;
        Ok(())
    }

    /**
     * Abre la bóveda con la contraseña del operador.
     *
     * # Errors:
     * - `Truncated` si el fichero no alcanza sal + nonce.
     * - `DecryptFailed` ante contraseña incorrecta o manipulación,
     *   sin distinción y sin material parcial.
     */
    pub fn load(path: &Path, password: &str) -> Result<DeviceConfig, VaultError> {
        let vault_bytes = std::fs::read(path)?;
        if vault_bytes.len() < SALT_LENGTH_BYTES + NONCE_LENGTH_BYTES {
            return Err(VaultError::Truncated);
        }

        let (salt, remainder) = vault_bytes.split_at(SALT_LENGTH_BYTES);
        let (nonce_bytes, ciphertext) = remainder.split_at(NONCE_LENGTH_BYTES);

        let derived_key = Self::derive_key(password, salt)?;
        let cipher_engine = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derived_key));

        let plaintext = cipher_engine
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| VaultError::DecryptFailed)?;

        serde_json::from_slice(&plaintext).map_err(|_| VaultError::DecryptFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> DeviceConfig {
        DeviceConfig {
            server_url: "https://mesh.example.com".into(),
            device_id: "dev-1".into(),
            virtual_network_id: "net-1".into(),
            virtual_ip: "10.99.0.2".into(),
            private_key_base64: "cHJpdmF0ZS1rZXk=".into(),
        }
    }

    #[test]
    fn round_trip_restores_identical_config() {
        let directory = tempfile::tempdir().unwrap();
        let vault_path = directory.path().join("edgelink.conf");

        let original = sample_config();
        ConfigVault::save(&original, &vault_path, "correct horse").unwrap();

        let restored = ConfigVault::load(&vault_path, "correct horse").unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn wrong_password_yields_masked_failure() {
        let directory = tempfile::tempdir().unwrap();
        let vault_path = directory.path().join("edgelink.conf");

        ConfigVault::save(&sample_config(), &vault_path, "correct horse").unwrap();
        let outcome = ConfigVault::load(&vault_path, "battery staple");
        assert!(matches!(outcome, Err(VaultError::DecryptFailed)));
    }

    #[test]
    fn tampered_byte_invalidates_whole_vault() {
        let directory = tempfile::tempdir().unwrap();
        let vault_path = directory.path().join("edgelink.conf");

        ConfigVault::save(&sample_config(), &vault_path, "correct horse").unwrap();

        let mut vault_bytes = std::fs::read(&vault_path).unwrap();
        let last_index = vault_bytes.len() - 1;
        vault_bytes[last_index] ^= 0x01;
        std::fs::write(&vault_path, vault_bytes).unwrap();

        assert!(matches!(
            ConfigVault::load(&vault_path, "correct horse"),
            Err(VaultError::DecryptFailed)
        ));
    }

    #[test]
    fn truncated_vault_is_detected_before_kdf() {
        let directory = tempfile::tempdir().unwrap();
        let vault_path = directory.path().join("edgelink.conf");
        std::fs::write(&vault_path, [0u8; 16]).unwrap();

        assert!(matches!(
            ConfigVault::load(&vault_path, "any"),
            Err(VaultError::Truncated)
        ));
    }

    #[test]
    fn vault_layout_is_salt_nonce_ciphertext() {
        let directory = tempfile::tempdir().unwrap();
        let vault_path = directory.path().join("edgelink.conf");

        ConfigVault::save(&sample_config(), &vault_path, "pw").unwrap();
        let vault_bytes = std::fs::read(&vault_path).unwrap();

        // Sal + nonce + al menos un bloque de ciphertext con etiqueta.
        assert!(vault_bytes.len() > SALT_LENGTH_BYTES + NONCE_LENGTH_BYTES + 16);
    }
}
