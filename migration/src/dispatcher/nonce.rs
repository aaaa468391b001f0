use common_primitives::node::Index;

/// Misuse of [`NonceState`]. The signing account and the chain no longer agree.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum NonceError {
	/// Only the nonce issued last can be handed back.
	#[error("Nonce {returned} returned, but the last issued nonce is {last_issued:?}")]
	Desynchronized {
		/// Nonce handed back
		returned: Index,
		/// Nonce issued last, `None` if it was already returned
		last_issued: Option<Index>,
	},
	/// The nonce space is exhausted.
	#[error("Nonce overflow after {0}")]
	Overflow(Index),
}

/// The signing account's next nonce, owned by one dispatcher.
#[derive(Debug, PartialEq, Eq)]
pub struct NonceState {
	next: Index,
	last_issued: Option<Index>,
}

impl NonceState {
	/// Starts at the account's on-chain nonce.
	pub fn new(initial: Index) -> Self {
		NonceState { next: initial, last_issued: None }
	}

	/// Issues the current nonce and moves past it.
	pub fn next_nonce(&mut self) -> Result<Index, NonceError> {
		let nonce = self.next;
		self.next = nonce.checked_add(1).ok_or(NonceError::Overflow(nonce))?;
		self.last_issued = Some(nonce);
		Ok(nonce)
	}

	/// Hands back `nonce` after its transaction never reached the pool.
	///
	/// Only the most recently issued nonce can be returned, anything else would leave a gap.
	pub fn return_nonce(&mut self, nonce: Index) -> Result<(), NonceError> {
		if self.last_issued != Some(nonce) {
			return Err(NonceError::Desynchronized { returned: nonce, last_issued: self.last_issued })
		}
		self.next = nonce;
		self.last_issued = None;
		Ok(())
	}

	/// The nonce the next transaction gets.
	pub fn peek(&self) -> Index {
		self.next
	}
}
