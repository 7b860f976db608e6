//! Deadline checks for each expectation kind.

use super::view::ViewLifecycle;
use crate::weak::{WeakCollection, WeakHandle};
use std::any::Any;

pub(crate) type AnyObject = dyn Any + Send + Sync;

/// A target found still retained. Carries its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Retained(pub(crate) String);

/// What an expectation inspects at its deadline. Holds no strong references.
pub(crate) enum Probe {
    Object(WeakHandle<AnyObject>),
    Collection(WeakCollection<AnyObject>),
    View(WeakHandle<dyn ViewLifecycle>),
    Views(WeakCollection<dyn ViewLifecycle>),
}

impl Probe {
    /// Runs the check. Must be called without the registry lock held: the
    /// view check upgrades its handle, and dropping that reference may run
    /// the view's destructor.
    pub(crate) fn evaluate(&self) -> Result<(), Retained> {
        match self {
            Self::Object(handle) => {
                if handle.is_alive() {
                    Err(Retained(handle.label().to_owned()))
                } else {
                    Ok(())
                }
            }
            Self::Collection(objects) => {
                if objects.is_empty() {
                    Ok(())
                } else {
                    Err(Retained(objects.to_string()))
                }
            }
            Self::View(handle) => match handle.get() {
                Some(view) if view.is_presented() => Err(Retained(handle.label().to_owned())),
                _ => Ok(()),
            },
            Self::Views(views) => {
                let presented: Vec<String> = views
                    .handles()
                    .into_iter()
                    .filter(|handle| handle.get().is_some_and(|view| view.is_presented()))
                    .map(|handle| handle.label().to_owned())
                    .collect();
                if presented.is_empty() {
                    Ok(())
                } else {
                    Err(Retained(format!("[{}]", presented.join(", "))))
                }
            }
        }
    }
}
