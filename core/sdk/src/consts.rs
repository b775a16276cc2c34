/// Upper bound on the summed bit width of one encrypted input bundle.
pub const MAX_INPUT_BITS: u32 = 2048;
/// Index and count of values are single bytes on the wire.
pub const MAX_INPUT_VALUES: usize = u8::MAX as usize;

/// Current ciphertext format version, stored in the last byte of every handle.
pub const CIPHERTEXT_VERSION: u8 = 0;

pub const HANDLE_BYTES: usize = relayer_wire::HANDLE_LENGTH;
pub const ADDRESS_BYTES: usize = 20;
// r (32 bytes), s (32 bytes) and the recovery id
pub const SIGNATURE_BYTES: usize = 65;

pub const DECRYPTION_DOMAIN_NAME: &str = "DecryptionManager";
pub const DECRYPTION_DOMAIN_VERSION: &str = "1";

pub const MAX_USER_DECRYPT_DURATION_DAYS: u64 = 365;
pub const MAX_USER_DECRYPT_CONTRACT_ADDRESSES: usize = 10;
pub const MAX_USER_DECRYPT_BITS: u32 = 2048;
pub const SECONDS_PER_DAY: u64 = 86_400;

pub const DEFAULT_DECRYPTION_TIMEOUT_SECS: u64 = 60;

pub const SAFE_SER_SIZE_LIMIT: u64 = 1024 * 1024 * 1024 * 2;
