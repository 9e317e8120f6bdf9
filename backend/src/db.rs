pub mod bill_items;
pub mod enterprise_versions;
pub mod enterprises;
pub mod orders;

pub use bill_items::PgBillItems;
pub use enterprise_versions::PgChangeHistory;
pub use enterprises::PgEnterprises;
pub use orders::PgOrders;
