mod impls;
mod pozo;
mod requests;
mod responses;
mod util;

pub use self::pozo::*;
pub use impls::*;
pub use requests::*;
pub use responses::*;
pub use util::*;
