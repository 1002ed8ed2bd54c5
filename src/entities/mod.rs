/// Database entities for the storefront order backend.
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod order;
pub mod order_detail;
pub mod payment_method;
pub mod product;
pub mod product_variant;
pub mod user;
pub mod voucher;
pub mod voucher_redemption;

// Re-export entities under their domain names
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_detail::{Entity as OrderDetail, Model as OrderDetailModel};
pub use payment_method::{Entity as PaymentMethod, Model as PaymentMethodModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use user::{Entity as User, Model as UserModel};
pub use voucher::{Entity as Voucher, Model as VoucherModel};
pub use voucher_redemption::{Entity as VoucherRedemption, Model as VoucherRedemptionModel};
