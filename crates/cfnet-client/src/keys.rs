//! Host key pair and the stores that provide it.
//!
//! The TLS context never owns key material. It asks a [`KeyStore`] for the
//! currently loaded pair and keeps a shared reference to it. Keys may not
//! exist at startup (they are often generated later by policy), so a store
//! can be asked to reload.

use std::{
    fmt,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{
        Arc, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::KeyError;

/// Private key of this host plus the matching public key.
///
/// The private key is kept as PKCS#8 DER, the public key as
/// SubjectPublicKeyInfo DER.
pub struct HostKeyPair {
    private_key: PrivatePkcs8KeyDer<'static>,
    public_key: Vec<u8>,
}

impl HostKeyPair {
    /// Generate a fresh ECDSA P-256 key pair.
    pub fn generate() -> Result<Self, KeyError> {
        let key_pair = rcgen::KeyPair::generate().map_err(KeyError::Generate)?;
        Ok(Self {
            private_key: PrivatePkcs8KeyDer::from(key_pair.serialize_der()),
            public_key: key_pair.public_key_der(),
        })
    }

    /// Load a key pair from a PKCS#8 DER private key.
    ///
    /// The public half is derived from the private key, so the two can never
    /// disagree.
    pub fn from_pkcs8_der(der: Vec<u8>) -> Result<Self, KeyError> {
        let key_pair = rcgen::KeyPair::try_from(der.as_slice()).map_err(KeyError::Parse)?;
        Ok(Self { private_key: PrivatePkcs8KeyDer::from(der), public_key: key_pair.public_key_der() })
    }

    /// Private key in the form rustls consumes.
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(self.private_key.clone_key())
    }

    /// Raw PKCS#8 DER of the private key.
    pub fn pkcs8_der(&self) -> &[u8] {
        self.private_key.secret_pkcs8_der()
    }

    /// SubjectPublicKeyInfo DER of the public key.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key
    }
}

impl fmt::Debug for HostKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostKeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key_len", &self.public_key.len())
            .finish()
    }
}

/// Source of the host key pair.
///
/// Implementations use interior mutability: `reload` is called through a
/// shared reference while the context is being initialized.
pub trait KeyStore {
    /// Currently loaded key pair, if any.
    fn current(&self) -> Option<Arc<HostKeyPair>>;

    /// Try to (re)load keys from persistent storage.
    ///
    /// Best effort. Callers check [`KeyStore::current`] afterwards instead of
    /// relying on the result.
    fn reload(&self) -> Result<(), KeyError>;
}

impl<K: KeyStore + ?Sized> KeyStore for Arc<K> {
    fn current(&self) -> Option<Arc<HostKeyPair>> {
        (**self).current()
    }

    fn reload(&self) -> Result<(), KeyError> {
        (**self).reload()
    }
}

/// In-memory key store.
///
/// Separates "loaded" keys from "stored" keys so tests can model keys that
/// only appear on disk after the process started.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    loaded: RwLock<Option<Arc<HostKeyPair>>>,
    stored: RwLock<Option<Arc<HostKeyPair>>>,
    reloads: AtomicUsize,
}

impl MemoryKeyStore {
    /// Store with nothing loaded and nothing to load.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Store with `keys` already loaded.
    pub fn with_keys(keys: HostKeyPair) -> Self {
        let keys = Arc::new(keys);
        Self {
            loaded: RwLock::new(Some(Arc::clone(&keys))),
            stored: RwLock::new(Some(keys)),
            reloads: AtomicUsize::new(0),
        }
    }

    /// Put `keys` in backing storage without loading them.
    pub fn store(&self, keys: HostKeyPair) {
        *write(&self.stored) = Some(Arc::new(keys));
    }

    /// Forget the loaded keys. Stored keys remain reloadable.
    pub fn unload(&self) {
        *write(&self.loaded) = None;
    }

    /// Number of `reload` calls so far.
    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::Relaxed)
    }
}

impl KeyStore for MemoryKeyStore {
    fn current(&self) -> Option<Arc<HostKeyPair>> {
        read(&self.loaded).clone()
    }

    fn reload(&self) -> Result<(), KeyError> {
        self.reloads.fetch_add(1, Ordering::Relaxed);
        let stored = read(&self.stored).clone();
        *write(&self.loaded) = stored;
        Ok(())
    }
}

/// Key store backed by a PEM private key file.
///
/// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) and RSA PKCS#1
/// (`BEGIN RSA PRIVATE KEY`, the traditional host key format). SEC1 EC keys
/// must be converted to PKCS#8 first.
///
/// Nothing is read until [`KeyStore::reload`] is called, either explicitly
/// or by the context when it finds no keys.
#[derive(Debug)]
pub struct PemKeyStore {
    path: PathBuf,
    loaded: RwLock<Option<Arc<HostKeyPair>>>,
}

impl PemKeyStore {
    /// Store reading the private key at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), loaded: RwLock::new(None) }
    }

    /// Path of the private key file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_key(&self) -> Result<HostKeyPair, KeyError> {
        let file = File::open(&self.path)
            .map_err(|source| KeyError::Io { path: self.path.clone(), source })?;
        let mut reader = BufReader::new(file);

        let key = rustls_pemfile::private_key(&mut reader)
            .map_err(|source| KeyError::Io { path: self.path.clone(), source })?
            .ok_or_else(|| KeyError::NoPrivateKey { path: self.path.clone() })?;

        match key {
            PrivateKeyDer::Pkcs8(der) => HostKeyPair::from_pkcs8_der(der.secret_pkcs8_der().to_vec()),
            PrivateKeyDer::Pkcs1(der) => {
                HostKeyPair::from_pkcs8_der(rsa_pkcs1_to_pkcs8(der.secret_pkcs1_der()))
            },
            _ => Err(KeyError::UnsupportedFormat { path: self.path.clone() }),
        }
    }
}

impl KeyStore for PemKeyStore {
    fn current(&self) -> Option<Arc<HostKeyPair>> {
        read(&self.loaded).clone()
    }

    fn reload(&self) -> Result<(), KeyError> {
        let keys = self.read_key()?;
        *write(&self.loaded) = Some(Arc::new(keys));
        Ok(())
    }
}

/// AlgorithmIdentifier for rsaEncryption (1.2.840.113549.1.1.1), NULL params.
const RSA_ENCRYPTION_ALG_ID: [u8; 15] =
    [0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00];

/// Wrap an RSAPrivateKey in a PKCS#8 PrivateKeyInfo:
/// `SEQUENCE { INTEGER 0, AlgorithmIdentifier, OCTET STRING pkcs1 }`.
fn rsa_pkcs1_to_pkcs8(pkcs1: &[u8]) -> Vec<u8> {
    let mut body = vec![0x02, 0x01, 0x00];
    body.extend_from_slice(&RSA_ENCRYPTION_ALG_ID);
    body.push(0x04);
    push_der_len(&mut body, pkcs1.len());
    body.extend_from_slice(pkcs1);

    let mut der = vec![0x30];
    push_der_len(&mut der, body.len());
    der.extend_from_slice(&body);
    der
}

fn push_der_len(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

// A panic while holding one of these locks cannot leave a half-written
// Option behind, so poisoning is ignored.
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}
