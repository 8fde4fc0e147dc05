// implemented by controllers that own timers or subscriptions which must be released on unmount
pub trait Destroyable {
    fn destroy(&mut self);
}
