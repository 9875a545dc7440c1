//! Packet catalogs and the connection stage machine
//!
//! Both directions are closed enums generated by [`packets!`]: one struct per
//! packet id plus a catalog enum that the codec frames and the dispatcher
//! routes on. Ids outside the catalog decode to `Unknown`.

pub mod client;
pub mod server;
pub mod types;

pub use client::ClientPacket;
pub use server::ServerPacket;

/// Coarse lifecycle phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameStage {
    #[default]
    None,
    Login,
    Select,
    Game,
    Observer,
    Disconnected,
}

impl GameStage {
    /// Forward-only, except logout (`Game -> Select`) and teardown, which is
    /// reachable from everywhere and never left.
    pub fn can_transition_to(self, next: GameStage) -> bool {
        use GameStage::*;
        match (self, next) {
            (Disconnected, _) => false,
            (_, Disconnected) => true,
            (None, Login) | (Login, Select) | (Select, Game) | (Game, Select) => true,
            (Game, Observer) | (Observer, Observer) => true,
            _ => false,
        }
    }
}

/// Implemented by every packet struct a catalog macro generates.
pub trait CatalogEntry: Sized {
    const ID: u16;
    const NAME: &'static str;
}

/// Declares a packet catalog.
///
/// Each entry becomes a struct with an `ID` constant and a field-order `Wire`
/// impl; the catalog enum gets `From`/`TryFrom` conversions and a
/// [`Packet`](crate::network::codec::Packet) impl.
macro_rules! packets {
    (
        $(#[$catalog_meta:meta])*
        $vis:vis enum $catalog:ident {
            $(
                $(#[$meta:meta])*
                $id:literal => $name:ident { $( $field:ident : $ty:ty ),* $(,)? }
            ),* $(,)?
        }
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Default)]
            pub struct $name {
                $( pub $field: $ty, )*
            }

            impl $name {
                pub const ID: u16 = $id;
            }

            impl $crate::protocol::CatalogEntry for $name {
                const ID: u16 = $id;
                const NAME: &'static str = stringify!($name);
            }

            impl $crate::network::wire::Wire for $name {
                #[allow(unused_variables)]
                fn read(
                    r: &mut $crate::network::wire::PacketReader<'_>,
                ) -> Result<Self, $crate::network::wire::WireError> {
                    Ok(Self {
                        $( $field: <$ty as $crate::network::wire::Wire>::read(r)?, )*
                    })
                }

                #[allow(unused_variables)]
                fn write(&self, out: &mut ::bytes::BytesMut) {
                    $( $crate::network::wire::Wire::write(&self.$field, out); )*
                }
            }

            impl From<$name> for $catalog {
                fn from(packet: $name) -> Self {
                    $catalog::$name(packet)
                }
            }

            impl TryFrom<$catalog> for $name {
                type Error = $catalog;

                fn try_from(packet: $catalog) -> Result<Self, Self::Error> {
                    match packet {
                        $catalog::$name(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }
        )*

        $(#[$catalog_meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $catalog {
            $( $name($name), )*
            /// An id outside the catalog, payload kept verbatim.
            Unknown { id: u16, payload: ::bytes::Bytes },
        }

        impl $catalog {
            /// Name of a catalog id, `None` when the id is unknown.
            pub fn name_of(id: u16) -> Option<&'static str> {
                match id {
                    $( $id => Some(stringify!($name)), )*
                    _ => None,
                }
            }
        }

        impl $crate::network::codec::Packet for $catalog {
            fn id(&self) -> u16 {
                match self {
                    $( $catalog::$name(_) => $id, )*
                    $catalog::Unknown { id, .. } => *id,
                }
            }

            fn name(&self) -> &'static str {
                match self {
                    $( $catalog::$name(_) => stringify!($name), )*
                    $catalog::Unknown { .. } => "Unknown",
                }
            }

            fn read_payload(
                id: u16,
                r: &mut $crate::network::wire::PacketReader<'_>,
            ) -> Result<Self, $crate::network::wire::WireError> {
                match id {
                    $( $id => <$name as $crate::network::wire::Wire>::read(r).map($catalog::$name), )*
                    _ => Ok($catalog::Unknown {
                        id,
                        payload: ::bytes::Bytes::copy_from_slice(r.read_rest()),
                    }),
                }
            }

            fn write_payload(&self, out: &mut ::bytes::BytesMut) {
                match self {
                    $( $catalog::$name(p) => $crate::network::wire::Wire::write(p, out), )*
                    $catalog::Unknown { payload, .. } => ::bytes::BufMut::put_slice(out, payload),
                }
            }
        }
    };
}

pub(crate) use packets;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_forward_path() {
        assert!(GameStage::None.can_transition_to(GameStage::Login));
        assert!(GameStage::Login.can_transition_to(GameStage::Select));
        assert!(GameStage::Select.can_transition_to(GameStage::Game));
        assert!(GameStage::Game.can_transition_to(GameStage::Select));
        assert!(GameStage::Game.can_transition_to(GameStage::Observer));
    }

    #[test]
    fn test_stage_rejects_skips_and_reversals() {
        assert!(!GameStage::None.can_transition_to(GameStage::Game));
        assert!(!GameStage::Select.can_transition_to(GameStage::Login));
        assert!(!GameStage::Observer.can_transition_to(GameStage::Game));
    }

    #[test]
    fn test_disconnected_is_terminal() {
        for stage in [
            GameStage::None,
            GameStage::Login,
            GameStage::Select,
            GameStage::Game,
            GameStage::Observer,
        ] {
            assert!(stage.can_transition_to(GameStage::Disconnected));
            assert!(!GameStage::Disconnected.can_transition_to(stage));
        }
        assert!(!GameStage::Disconnected.can_transition_to(GameStage::Disconnected));
    }
}
