/// Gives a board resource one name for all firmware code: `define_pins!`
/// generates an exported `alias!(owner)` macro expanding to `owner.field`,
/// so `status_led!(pins)` is `pins.led` on this board.
#[macro_export]
macro_rules! define_pins {
    ($($(#[doc = $doc:expr])* $alias:ident => $field:tt),* $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[macro_export]
            macro_rules! $alias {
                ($owner:expr) => {
                    $owner.$field
                };
            }
        )*
    };
}
