pub mod banner;
pub mod channel;
pub mod packet;

pub use banner::{BannerChange, DisconnectBanner};
pub use channel::{ChannelError, ChannelOptions, ConnectionState, HandlerId, RealtimeChannel};
pub use packet::{endpoint_url, EnginePacket, PacketError, SocketPacket};
