use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::func::FuncRegistry;
use crate::value::{
    Composite, KIND_FUNC, KIND_LIST, KIND_MAP, KIND_OBJECT, KIND_RESPONSE, KIND_SET,
    KIND_TIMESTAMP, Value,
};
use crate::wire::{self, DecodeError};

/// A decode function: serialized record bytes in, composite body out, with
/// child references still unresolved.
pub type Decoder = Box<dyn Fn(&[u8]) -> Result<Composite, DecodeError> + Send + Sync>;

/// The type registry: kind name → decoder.
///
/// Always pre-seeded with the built-in kinds; user types add an entry once,
/// either through [`register`](Registry::register) or through the model
/// layer. Lookups during load treat a missing entry as a hard failure; it
/// signals a registration the caller forgot, not a transient fault.
pub struct Registry {
    decoders: RwLock<HashMap<String, Decoder>>,
}

impl Registry {
    /// Builds a registry seeded with decoders for every built-in kind.
    pub(crate) fn with_builtins(funcs: Arc<FuncRegistry>) -> Self {
        let registry = Registry {
            decoders: RwLock::new(HashMap::new()),
        };

        registry.register(KIND_OBJECT, |bytes| {
            Ok(Composite::Record {
                kind: KIND_OBJECT.into(),
                fields: wire::decode_fields(bytes)?,
            })
        });
        registry.register(KIND_LIST, |bytes| {
            Ok(Composite::List(wire::decode_items(bytes)?))
        });
        registry.register(KIND_MAP, |bytes| {
            Ok(Composite::Map(wire::decode_entries(bytes)?))
        });
        registry.register(KIND_SET, |bytes| {
            Ok(Composite::Set(wire::decode_items(bytes)?))
        });
        registry.register(KIND_TIMESTAMP, |bytes| {
            Ok(Composite::Timestamp(wire::decode_timestamp(bytes)?))
        });
        registry.register(KIND_FUNC, move |bytes| {
            let name = wire::decode_func_name(bytes)?;
            funcs
                .resolve(&name)
                .map(Composite::Func)
                .ok_or(DecodeError::UnknownFunc(name))
        });
        registry.register(KIND_RESPONSE, |bytes| {
            Ok(Composite::Response(wire::decode_response(bytes)?))
        });

        registry
    }

    /// Registers a decoder under `name`, replacing any previous entry.
    pub fn register(
        &self,
        name: impl Into<String>,
        decoder: impl Fn(&[u8]) -> Result<Composite, DecodeError> + Send + Sync + 'static,
    ) {
        let name = name.into();
        debug!(kind = %name, "registered decoder");
        self.decoders
            .write()
            .unwrap()
            .insert(name, Box::new(decoder));
    }

    /// Registers a record-kind decoder for a user type: decoded fields are
    /// overlaid onto the factory's default fields. Registration is
    /// insert-once; a later call with the same name is a no-op.
    pub fn register_record(
        &self,
        name: impl Into<String>,
        factory: impl Fn() -> IndexMap<String, Value> + Send + Sync + 'static,
    ) {
        let name = name.into();
        let mut decoders = self.decoders.write().unwrap();
        if decoders.contains_key(&name) {
            return;
        }
        debug!(kind = %name, "registered record type");
        let kind = name.clone();
        decoders.insert(
            name,
            Box::new(move |bytes| {
                let mut fields = factory();
                for (field, value) in wire::decode_fields(bytes)? {
                    fields.insert(field, value);
                }
                Ok(Composite::Record {
                    kind: kind.clone(),
                    fields,
                })
            }),
        );
    }

    /// Whether a decoder is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.decoders.read().unwrap().contains_key(name)
    }

    /// Runs the decoder for `kind`, or `None` when none is registered.
    pub(crate) fn decode(&self, kind: &str, bytes: &[u8]) -> Option<Result<Composite, DecodeError>> {
        let decoders = self.decoders.read().unwrap();
        decoders.get(kind).map(|decoder| decoder(bytes))
    }
}
