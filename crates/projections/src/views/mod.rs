//! Read models and view models of the shopping list context.

pub mod shopping_list;
pub mod shopping_lists;

pub use shopping_list::ShoppingListViewModel;
pub use shopping_lists::{AllShoppingLists, ShoppingListById, ShoppingListsProjection};
