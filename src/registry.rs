use core::ops::Index;
use snafu::OptionExt;

use crate::endpoint::Endpoint;
use crate::error::{InvalidIdSnafu, Result};
use crate::types::EndpointId;

/// The fixed set of bus endpoints, indexed by [`EndpointId`].
#[derive(Debug)]
pub(crate) struct EndpointRegistry {
    endpoints: Box<[Endpoint]>,
}

impl EndpointRegistry {
    pub fn new(count: usize, queue_capacity: usize) -> EndpointRegistry {
        EndpointRegistry {
            endpoints: (0..count)
                .map(|id| Endpoint::new(EndpointId::new(id), queue_capacity))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn get(&self, id: EndpointId) -> Result<&Endpoint> {
        self.endpoints.get(*id).context(InvalidIdSnafu {
            id: *id,
            count: self.len(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }
}

impl Index<EndpointId> for EndpointRegistry {
    type Output = Endpoint;

    fn index(&self, id: EndpointId) -> &Self::Output {
        &self.endpoints[*id]
    }
}
