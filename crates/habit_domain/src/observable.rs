use tokio::sync::watch;

/// Single-writer state container. Each [`Observable::update`] is published as
/// one snapshot, so subscribers never observe a half-applied change.
#[derive(Debug)]
pub struct Observable<T> {
    sender: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn snapshot(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Read without cloning the whole snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.sender.borrow())
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.sender.send_modify(f);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        loading: bool,
        value: u32,
    }

    #[tokio::test]
    async fn subscribers_see_whole_updates() {
        let observable = Observable::new(Counter::default());
        let mut rx = observable.subscribe();

        observable.update(|state| {
            state.loading = false;
            state.value = 7;
        });

        rx.changed().await.expect("sender alive");
        assert_eq!(
            *rx.borrow_and_update(),
            Counter {
                loading: false,
                value: 7
            }
        );
        assert_eq!(observable.read(|state| state.value), 7);
    }
}
