pub use ::tokio_util::codec as tokio_codec;

mod frame;

pub use self::frame::*;
