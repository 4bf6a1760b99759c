//! Built-in format plugins.

mod epub;
mod fb2;
mod html;
mod mobi;
mod txt;

pub use epub::EpubPlugin;
pub use fb2::Fb2Plugin;
pub use html::HtmlPlugin;
pub use mobi::MobiPlugin;
pub use txt::TxtPlugin;
