//! 服务端资源：每个域每类服务一个实例，持有本域的全部实体。

mod spreadsheets;
mod users;

pub use spreadsheets::SpreadsheetsResource;
pub use users::UsersResource;
