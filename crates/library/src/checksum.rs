//! `std.checksum` members.
//!
//! One-shot digests over a byte string, plus stateful hasher objects whose
//! private state is an opaque value with `update`/`finish` members. CRC-32
//! (ISO 3309, reflected, table driven) and FNV-1a (32-bit) yield integers;
//! MD5, SHA-1 and SHA-256 yield uppercase hex strings.

use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::rc::Rc;

use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use sha1::Sha1;
use sha2::Sha256;

use asteria_runtime::{
    Exception, FunctionValue, GlobalContext, Modifier, OpaqueData, Reference, RuntimeError,
    SourceLocation, Value,
};

use crate::argread::ArgumentReader;

// ---------------------------------------------------------------------------
// CRC-32 (ISO 3309)

static CRC32_TABLE: Lazy<[u32; 256]> = Lazy::new(|| {
    let mut table = [0u32; 256];
    for (index, slot) in table.iter_mut().enumerate() {
        let mut reg = index as u32;
        for _ in 0..8 {
            if reg & 1 != 0 {
                reg = (reg >> 1) ^ 0xEDB8_8320;
            } else {
                reg >>= 1;
            }
        }
        *slot = reg;
    }
    table
});

struct Crc32Hasher {
    reg: Cell<u32>,
}

impl Crc32Hasher {
    fn new() -> Self {
        Self {
            reg: Cell::new(!0),
        }
    }

    fn update(&self, data: &[u8]) {
        let mut reg = self.reg.get();
        for byte in data {
            reg = CRC32_TABLE[usize::from((reg as u8) ^ byte)] ^ (reg >> 8);
        }
        self.reg.set(reg);
    }

    /// Finalize and reset, so the hasher is reusable.
    fn finish(&self) -> Value {
        let checksum = !self.reg.replace(!0);
        Value::Integer(i64::from(checksum))
    }
}

impl OpaqueData for Crc32Hasher {
    fn describe(&self) -> String {
        "CRC-32 hasher".to_string()
    }
}

// ---------------------------------------------------------------------------
// FNV-1a (32-bit)

const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

struct Fnv1a32Hasher {
    reg: Cell<u32>,
}

impl Fnv1a32Hasher {
    fn new() -> Self {
        Self {
            reg: Cell::new(FNV_OFFSET_BASIS),
        }
    }

    fn update(&self, data: &[u8]) {
        let mut reg = self.reg.get();
        for byte in data {
            reg = (reg ^ u32::from(*byte)).wrapping_mul(FNV_PRIME);
        }
        self.reg.set(reg);
    }

    fn finish(&self) -> Value {
        let checksum = self.reg.replace(FNV_OFFSET_BASIS);
        Value::Integer(i64::from(checksum))
    }
}

impl OpaqueData for Fnv1a32Hasher {
    fn describe(&self) -> String {
        "FNV-1a hasher".to_string()
    }
}

// ---------------------------------------------------------------------------
// MD5 / SHA-1 / SHA-256

fn hex_upper(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

struct Md5Hasher {
    inner: RefCell<Md5>,
}

impl Md5Hasher {
    fn new() -> Self {
        Self {
            inner: RefCell::new(Md5::new()),
        }
    }

    fn update(&self, data: &[u8]) {
        self.inner.borrow_mut().update(data);
    }

    fn finish(&self) -> Value {
        let digest = self.inner.borrow_mut().finalize_reset();
        Value::from(hex_upper(&digest))
    }
}

impl OpaqueData for Md5Hasher {
    fn describe(&self) -> String {
        "MD5 hasher".to_string()
    }
}

struct Sha1Hasher {
    inner: RefCell<Sha1>,
}

impl Sha1Hasher {
    fn new() -> Self {
        Self {
            inner: RefCell::new(Sha1::new()),
        }
    }

    fn update(&self, data: &[u8]) {
        self.inner.borrow_mut().update(data);
    }

    fn finish(&self) -> Value {
        let digest = self.inner.borrow_mut().finalize_reset();
        Value::from(hex_upper(&digest))
    }
}

impl OpaqueData for Sha1Hasher {
    fn describe(&self) -> String {
        "SHA-1 hasher".to_string()
    }
}

struct Sha256Hasher {
    inner: RefCell<Sha256>,
}

impl Sha256Hasher {
    fn new() -> Self {
        Self {
            inner: RefCell::new(Sha256::new()),
        }
    }

    fn update(&self, data: &[u8]) {
        self.inner.borrow_mut().update(data);
    }

    fn finish(&self) -> Value {
        let digest = self.inner.borrow_mut().finalize_reset();
        Value::from(hex_upper(&digest))
    }
}

impl OpaqueData for Sha256Hasher {
    fn describe(&self) -> String {
        "SHA-256 hasher".to_string()
    }
}

// ---------------------------------------------------------------------------
// Bindings

// The private member a hasher object keeps its opaque state under.
const PRIVATE_MEMBER: &str = "!h";

fn return_value(self_ref: &mut Reference, value: Value) {
    *self_ref = Reference::temporary(value);
}

fn private_hasher(self_arg: &Reference) -> Result<Value, Exception> {
    let mut refr = self_arg.clone();
    refr.zoom_in(Modifier::ObjectKey(PRIVATE_MEMBER.to_string()));
    refr.read()
        .map_err(|e| Exception::from_runtime_error(SourceLocation::native(), e))
}

fn hasher_mismatch(name: &str) -> Exception {
    Exception::from_runtime_error(
        SourceLocation::native(),
        RuntimeError::NoMatchingCall {
            name: name.to_string(),
            signature: "(data)".to_string(),
        },
    )
}

macro_rules! one_shot {
    ($fn_name:ident, $display:expr, $hasher:ident) => {
        fn $fn_name(
            self_ref: &mut Reference,
            args: &mut Vec<Reference>,
            _global: &mut GlobalContext,
        ) -> Result<(), Exception> {
            let mut reader = ArgumentReader::start($display, args);
            let data = reader.required_string()?;
            reader.finish()?;
            let hasher = $hasher::new();
            hasher.update(data.as_bytes());
            return_value(self_ref, hasher.finish());
            Ok(())
        }
    };
}

one_shot!(std_checksum_crc32, "std.checksum.crc32", Crc32Hasher);
one_shot!(std_checksum_fnv1a32, "std.checksum.fnv1a32", Fnv1a32Hasher);
one_shot!(std_checksum_md5, "std.checksum.md5", Md5Hasher);
one_shot!(std_checksum_sha1, "std.checksum.sha1", Sha1Hasher);
one_shot!(std_checksum_sha256, "std.checksum.sha256", Sha256Hasher);

macro_rules! hasher_object {
    ($new_name:ident, $update_name:ident, $finish_name:ident,
     $new_display:expr, $update_display:expr, $finish_display:expr,
     $hasher:ident) => {
        fn $update_name(
            self_ref: &mut Reference,
            args: &mut Vec<Reference>,
            _global: &mut GlobalContext,
        ) -> Result<(), Exception> {
            let mut reader = ArgumentReader::start($update_display, args);
            let data = reader.required_string()?;
            let state = private_hasher(reader.self_argument())?;
            reader.finish()?;
            let hasher = state
                .as_opaque_data::<$hasher>()
                .ok_or_else(|| hasher_mismatch($update_display))?;
            hasher.update(data.as_bytes());
            return_value(self_ref, Value::Null);
            Ok(())
        }

        fn $finish_name(
            self_ref: &mut Reference,
            args: &mut Vec<Reference>,
            _global: &mut GlobalContext,
        ) -> Result<(), Exception> {
            let reader = ArgumentReader::start($finish_display, args);
            let state = private_hasher(reader.self_argument())?;
            reader.finish()?;
            let hasher = state
                .as_opaque_data::<$hasher>()
                .ok_or_else(|| hasher_mismatch($finish_display))?;
            return_value(self_ref, hasher.finish());
            Ok(())
        }

        fn $new_name(
            self_ref: &mut Reference,
            args: &mut Vec<Reference>,
            _global: &mut GlobalContext,
        ) -> Result<(), Exception> {
            let reader = ArgumentReader::start($new_display, args);
            reader.finish()?;
            let object = Value::object_from_pairs([
                (
                    PRIVATE_MEMBER,
                    Value::opaque(Rc::new($hasher::new())),
                ),
                (
                    "update",
                    Value::Function(FunctionValue::native($update_display, $update_name)),
                ),
                (
                    "finish",
                    Value::Function(FunctionValue::native($finish_display, $finish_name)),
                ),
            ]);
            return_value(self_ref, object);
            Ok(())
        }
    };
}

hasher_object!(
    std_checksum_crc32_new,
    std_checksum_crc32_new_update,
    std_checksum_crc32_new_finish,
    "std.checksum.crc32_new",
    "std.checksum.crc32_new.update",
    "std.checksum.crc32_new.finish",
    Crc32Hasher
);
hasher_object!(
    std_checksum_fnv1a32_new,
    std_checksum_fnv1a32_new_update,
    std_checksum_fnv1a32_new_finish,
    "std.checksum.fnv1a32_new",
    "std.checksum.fnv1a32_new.update",
    "std.checksum.fnv1a32_new.finish",
    Fnv1a32Hasher
);
hasher_object!(
    std_checksum_md5_new,
    std_checksum_md5_new_update,
    std_checksum_md5_new_finish,
    "std.checksum.md5_new",
    "std.checksum.md5_new.update",
    "std.checksum.md5_new.finish",
    Md5Hasher
);
hasher_object!(
    std_checksum_sha1_new,
    std_checksum_sha1_new_update,
    std_checksum_sha1_new_finish,
    "std.checksum.sha1_new",
    "std.checksum.sha1_new.update",
    "std.checksum.sha1_new.finish",
    Sha1Hasher
);
hasher_object!(
    std_checksum_sha256_new,
    std_checksum_sha256_new_update,
    std_checksum_sha256_new_finish,
    "std.checksum.sha256_new",
    "std.checksum.sha256_new.update",
    "std.checksum.sha256_new.finish",
    Sha256Hasher
);

/// The `std.checksum` object.
pub fn create_bindings_checksum() -> Value {
    Value::object_from_pairs([
        (
            "crc32",
            Value::Function(FunctionValue::native("std.checksum.crc32", std_checksum_crc32)),
        ),
        (
            "crc32_new",
            Value::Function(FunctionValue::native(
                "std.checksum.crc32_new",
                std_checksum_crc32_new,
            )),
        ),
        (
            "fnv1a32",
            Value::Function(FunctionValue::native(
                "std.checksum.fnv1a32",
                std_checksum_fnv1a32,
            )),
        ),
        (
            "fnv1a32_new",
            Value::Function(FunctionValue::native(
                "std.checksum.fnv1a32_new",
                std_checksum_fnv1a32_new,
            )),
        ),
        (
            "md5",
            Value::Function(FunctionValue::native("std.checksum.md5", std_checksum_md5)),
        ),
        (
            "md5_new",
            Value::Function(FunctionValue::native(
                "std.checksum.md5_new",
                std_checksum_md5_new,
            )),
        ),
        (
            "sha1",
            Value::Function(FunctionValue::native("std.checksum.sha1", std_checksum_sha1)),
        ),
        (
            "sha1_new",
            Value::Function(FunctionValue::native(
                "std.checksum.sha1_new",
                std_checksum_sha1_new,
            )),
        ),
        (
            "sha256",
            Value::Function(FunctionValue::native(
                "std.checksum.sha256",
                std_checksum_sha256,
            )),
        ),
        (
            "sha256_new",
            Value::Function(FunctionValue::native(
                "std.checksum.sha256_new",
                std_checksum_sha256_new,
            )),
        ),
    ])
}
